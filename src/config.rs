/// Container-level configuration.
/// ## Fields
/// - `unique_registration_ids`:
///   If `true`, registrations sharing a (contract, name) key coexist instead
///   of the earlier one winning, and are tried in registration order.
#[derive(Clone, Copy)]
pub struct ContainerConfig {
    pub unique_registration_ids: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            unique_registration_ids: false,
        }
    }
}
