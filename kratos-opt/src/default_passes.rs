//! Defines the default pass pipeline available to [PassManager].
use crate::pass_manager::{PassManager, PassResult, Transform};
use crate::passes::{
    CheckMixedAssignment, CreateModuleInstantiation, DecoupleGeneratorPorts,
    FixAssignmentType, HashGenerators, HashStrategy, MergeWireAssignments,
    RemoveFanoutOneWires, RemovePassThroughModules, RemoveUnusedVars,
    TransformIfToCase, UniquifyGenerators, UniquifyModuleInstances,
    VerifyAssignments, VerifyGeneratorConnectivity, ZeroOutStubs,
};

/// Host-facing configuration for the default pipeline. Optional passes
/// are off unless requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    /// Hash the hierarchy with the parallel strategy.
    pub use_parallel: bool,
    /// Rewrite constant equality if-chains into case statements.
    pub run_if_to_case_pass: bool,
    /// Collapse modules that only forward inputs to outputs.
    pub remove_passthrough: bool,
    /// Short-circuit single-driver single-consumer wires.
    pub run_fanout_one_pass: bool,
}

impl PassManager {
    /// Construct the default pipeline. Order matters: later passes
    /// assume the invariants established by earlier ones.
    pub fn default_passes(opts: &PassOptions) -> PassResult<Self> {
        let mut pm = PassManager::default();

        if opts.remove_passthrough {
            pm.register_pass::<RemovePassThroughModules>()?;
        }
        if opts.run_if_to_case_pass {
            pm.register_pass::<TransformIfToCase>()?;
        }
        pm.register_pass::<FixAssignmentType>()?;
        pm.register_pass::<ZeroOutStubs>()?;
        if opts.run_fanout_one_pass {
            pm.register_pass::<RemoveFanoutOneWires>()?;
        }
        pm.register_pass::<DecoupleGeneratorPorts>()?;
        pm.register_pass::<RemoveUnusedVars>()?;

        // semantic checks over the settled IR
        pm.register_pass::<VerifyAssignments>()?;
        pm.register_pass::<VerifyGeneratorConnectivity>()?;
        pm.register_pass::<CheckMixedAssignment>()?;

        pm.register_pass::<MergeWireAssignments>()?;

        let strategy = if opts.use_parallel {
            HashStrategy::Parallel
        } else {
            HashStrategy::Sequential
        };
        pm.add_pass(
            "hash_generators",
            Box::new(move |ctx, root| {
                HashGenerators::with_strategy(strategy).run(ctx, root)
            }),
        )?;

        pm.register_pass::<UniquifyGenerators>()?;
        pm.register_pass::<UniquifyModuleInstances>()?;
        pm.register_pass::<CreateModuleInstantiation>()?;

        Ok(pm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sequence_is_ordered() {
        let pm = PassManager::default_passes(&PassOptions::default())
            .unwrap();
        assert_eq!(
            pm.pass_names(),
            vec![
                "fix_assignment_type",
                "zero_out_stubs",
                "decouple_generator_ports",
                "remove_unused_vars",
                "verify_assignments",
                "verify_generator_connectivity",
                "check_mixed_assignment",
                "merge_wire_assignments",
                "hash_generators",
                "uniquify_generators",
                "uniquify_module_instances",
                "create_module_instantiation",
            ]
        );
    }

    #[test]
    fn optional_passes_enabled() {
        let pm = PassManager::default_passes(&PassOptions {
            use_parallel: true,
            run_if_to_case_pass: true,
            remove_passthrough: true,
            run_fanout_one_pass: true,
        })
        .unwrap();
        let names = pm.pass_names();
        assert_eq!(names[0], "remove_pass_through_modules");
        assert_eq!(names[1], "transform_if_to_case");
        assert!(names.contains(&"remove_fanout_one_wires"));
    }
}
