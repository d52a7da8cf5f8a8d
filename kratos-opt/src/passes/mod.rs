//! The scheduled passes. See
//! [`PassManager::default_passes`](crate::PassManager::default_passes)
//! for the order in which they run.
mod check_mixed_assignment;
mod create_module_instantiation;
mod decouple_generator_ports;
mod fix_assignment_type;
mod hash_generators;
mod merge_wire_assignments;
mod remove_fanout_one_wires;
mod remove_pass_through_modules;
mod remove_unused_vars;
mod transform_if_to_case;
mod uniquify;
mod verify_assignments;
mod verify_generator_connectivity;
mod zero_out_stubs;

pub use check_mixed_assignment::CheckMixedAssignment;
pub use create_module_instantiation::CreateModuleInstantiation;
pub use decouple_generator_ports::DecoupleGeneratorPorts;
pub use fix_assignment_type::FixAssignmentType;
pub use hash_generators::{HashGenerators, HashStrategy};
pub use merge_wire_assignments::MergeWireAssignments;
pub use remove_fanout_one_wires::RemoveFanoutOneWires;
pub use remove_pass_through_modules::RemovePassThroughModules;
pub use remove_unused_vars::RemoveUnusedVars;
pub use transform_if_to_case::TransformIfToCase;
pub use uniquify::{UniquifyGenerators, UniquifyModuleInstances};
pub use verify_assignments::VerifyAssignments;
pub use verify_generator_connectivity::VerifyGeneratorConnectivity;
pub use zero_out_stubs::ZeroOutStubs;
