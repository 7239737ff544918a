use crate::domain::error::DomainError;
use crate::domain::values::guardrail::GuardrailProfile;

/// Persistence for named guardrail profiles and the active selection.
pub trait ProfileStore: Send + Sync {
    fn save_profile(&self, profile: &GuardrailProfile) -> Result<(), DomainError>;
    fn get_profile(&self, name: &str) -> Result<Option<GuardrailProfile>, DomainError>;
    fn list_profiles(&self) -> Result<Vec<GuardrailProfile>, DomainError>;
    fn set_active(&self, name: &str) -> Result<(), DomainError>;
    fn active_profile(&self) -> Result<Option<GuardrailProfile>, DomainError>;
}
