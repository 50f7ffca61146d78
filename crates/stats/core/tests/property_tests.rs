//! Property tests for the deterministic kernels.

use proptest::prelude::*;

use stat_core::{
    Bucket, CapContribution, CapKind, CapLayer, CapMode, Contribution, LayerSet, MergePolicy,
    ReductionMode, RuleTable, compose, effective_caps_across_layers,
};

fn bucket_strategy() -> impl Strategy<Value = Bucket> {
    prop_oneof![
        Just(Bucket::Additive),
        Just(Bucket::Multiplicative),
        Just(Bucket::PostAdditive),
        Just(Bucket::Override),
    ]
}

fn contribution_strategy() -> impl Strategy<Value = Contribution> {
    (
        bucket_strategy(),
        -100.0f64..100.0,
        "[a-z]{1,8}",
        proptest::option::of(0i64..20),
    )
        .prop_map(|(bucket, value, system, priority)| Contribution {
            dimension: "power".to_string(),
            bucket,
            value,
            system,
            priority,
            tags: None,
        })
}

fn cap_strategy() -> impl Strategy<Value = CapContribution> {
    (
        prop_oneof![Just(CapMode::Min), Just(CapMode::Max), Just(CapMode::Both)],
        prop_oneof![
            Just(CapKind::Absolute),
            Just(CapKind::PercentAdditive),
            Just(CapKind::Override),
        ],
        -500.0f64..500.0,
        "[a-z]{1,8}",
        prop_oneof![Just("base"), Just("equipment"), Just("event")],
        proptest::option::of(0i64..20),
    )
        .prop_map(|(mode, kind, value, system, layer, priority)| CapContribution {
            system,
            dimension: "power".to_string(),
            mode,
            kind,
            value,
            priority,
            layer: layer.to_string(),
            realm: None,
            tags: None,
        })
}

fn layer_set_strategy() -> impl Strategy<Value = LayerSet> {
    let merge = prop_oneof![
        Just(MergePolicy::Intersect),
        Just(MergePolicy::Sum),
        Just(MergePolicy::Min),
        Just(MergePolicy::Max),
        Just(MergePolicy::WeightedAverage),
    ];
    let reduction = prop_oneof![
        Just(ReductionMode::Narrow),
        Just(ReductionMode::Widen),
        Just(ReductionMode::Override),
    ];
    proptest::collection::vec((merge, reduction), 3).prop_map(|modes| {
        let ids = ["base", "equipment", "event"];
        LayerSet::new(
            modes
                .into_iter()
                .zip(ids)
                .map(|((m, r), id)| CapLayer::new(id, m, r))
                .collect(),
        )
    })
}

proptest! {
    /// Identical contribution multisets compose to identical values, for
    /// every permutation.
    #[test]
    fn compose_is_permutation_invariant(
        mut contributions in proptest::collection::vec(contribution_strategy(), 0..8),
        seed in 0u64..1000,
    ) {
        let table = RuleTable::new();
        let expected = compose("power", &contributions, &table).unwrap();

        // Cheap deterministic shuffle
        let len = contributions.len().max(1);
        for i in 0..contributions.len() {
            let j = ((seed as usize).wrapping_mul(31).wrapping_add(i * 7)) % len;
            contributions.swap(i, j);
        }

        let shuffled = compose("power", &contributions, &table).unwrap();
        prop_assert_eq!(expected, shuffled);
    }

    /// The across-layer fold always yields a legal range.
    #[test]
    fn effective_caps_always_ordered(
        set in layer_set_strategy(),
        caps in proptest::collection::vec(cap_strategy(), 0..12),
    ) {
        let outcome = effective_caps_across_layers(&set, &caps, None);
        for (dimension, range) in &outcome.caps {
            prop_assert!(
                range.min <= range.max,
                "inverted range for {}: [{}, {}]",
                dimension, range.min, range.max
            );
        }
    }

    /// Clamping is idempotent, and a no-op for in-range values.
    #[test]
    fn clamp_is_idempotent(
        min in -100.0f64..100.0,
        span in 0.0f64..200.0,
        value in -500.0f64..500.0,
    ) {
        let range = stat_core::CapRange::new(min, min + span);
        let once = range.clamp(value);
        prop_assert_eq!(once, range.clamp(once));
        if range.contains(value) {
            prop_assert_eq!(once, value);
        }
    }
}
