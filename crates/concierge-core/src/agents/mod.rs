//! Specialists: which are enabled, how they are described on disk, and the
//! live registry the dispatcher reads from.

pub mod llm_specialist;
pub mod loader;
pub mod profile;
pub mod registry;
pub mod roster;

pub use llm_specialist::LlmSpecialist;
pub use loader::{SpecialistContext, discover_profiles, load_specialists};
pub use profile::{ProfileFile, SpecialistProfile};
pub use registry::{Specialist, SpecialistOutput, SpecialistRegistry};
pub use roster::{EnabledAgents, display_name};
