use chm_ctmc::modifier::{
    AdjacencyWindow, ClassTable, Coordinate, DistanceMetric, EpochGeography, PhyloDistance,
    RangeContext, StateCount,
};
use chm_ctmc::{CharacterEvent, ModifierConfig, ModifyRate, RateModifier};
use proptest::prelude::*;

fn all_modifiers() -> Vec<RateModifier> {
    let distances = vec![
        vec![0.0, 1.0, 2.0, 3.0],
        vec![1.0, 0.0, 1.0, 2.0],
        vec![2.0, 1.0, 0.0, 1.0],
        vec![3.0, 2.0, 1.0, 0.0],
    ];
    let coords = vec![
        Coordinate { latitude: 0.0, longitude: 0.0 },
        Coordinate { latitude: 5.0, longitude: 5.0 },
        Coordinate { latitude: 10.0, longitude: 0.0 },
        Coordinate { latitude: 15.0, longitude: 5.0 },
    ];
    vec![
        AdjacencyWindow::new(1, 0.7).unwrap().into(),
        PhyloDistance::new(distances, 0.8).unwrap().into(),
        RangeContext::new(4, &[(0, 1, 1.0), (1, 2, 0.5), (3, 0, 2.0)], true)
            .unwrap()
            .into(),
        ClassTable::new(
            vec![0, 1, 0, 1],
            vec![vec![0, 0], vec![1, 0]],
            vec![vec![0.5, 1.5], vec![1.0, 1.0]],
        )
        .unwrap()
        .into(),
        StateCount::new(1.7).unwrap().into(),
        EpochGeography::new(
            vec![3.0, 0.0],
            vec![vec![vec![1.0; 4]; 4], vec![vec![1.0; 4]; 4]],
            true,
            Some(coords),
            DistanceMetric::Haversine,
            1.5,
        )
        .unwrap()
        .into(),
    ]
}

proptest! {
    #[test]
    fn multipliers_are_pure_and_non_negative(
        states in proptest::collection::vec(0usize..2, 4),
        site in 0usize..4,
        age in 0.0f64..6.0,
    ) {
        let target = 1 - states[site];
        let event = CharacterEvent::new(site, target, 0.5);
        for modifier in all_modifiers() {
            let first = modifier.compute_multiplier(&states, &event, age, None);
            let second = modifier.compute_multiplier(&states, &event, age, None);
            prop_assert_eq!(first.to_bits(), second.to_bits(), "{}", modifier.name());
            prop_assert!(first >= 0.0, "{} returned {}", modifier.name(), first);
        }
    }
}

#[test]
fn update_is_idempotent() {
    for mut modifier in all_modifiers() {
        let states = [1, 0, 1, 0];
        let event = CharacterEvent::new(1, 1, 0.5);
        let before = modifier.compute_multiplier(&states, &event, 1.0, None);
        modifier.update();
        modifier.update();
        let after = modifier.compute_multiplier(&states, &event, 1.0, None);
        assert_eq!(before.to_bits(), after.to_bits(), "{}", modifier.name());
    }
}

#[test]
fn yaml_configs_build_modifiers() {
    let yaml = r#"
- kind: adjacency-window
  width: 1
  factor: 0.5
- kind: state-count
  factor: 2.0
- kind: range-context
  edges: [[0, 1, 0.5], [2, 1, 1.5]]
- kind: host-switch
  host_parents: [3, 3, 4, 4, -1]
  host_branch_lengths: [1.0, 1.0, 2.0, 1.0, 0.0]
  scale: 0.25
- kind: epoch-geography
  use_adjacency: true
  epochs:
    - end_age: 2.0
      dispersal: [[1, 1, 0], [1, 1, 0], [0, 0, 0]]
    - end_age: 0.0
      dispersal: [[1, 1, 1], [1, 1, 1], [1, 1, 1]]
"#;
    let configs: Vec<ModifierConfig> = serde_yaml::from_str(yaml).unwrap();
    let names: Vec<&str> = configs
        .iter()
        .map(|config| config.build(3, 2, false).unwrap().name())
        .collect();
    assert_eq!(
        names,
        vec![
            "adjacency-window",
            "state-count",
            "range-context",
            "phylo-distance",
            "epoch-geography"
        ]
    );
}

#[test]
fn mismatched_dimensions_are_config_errors() {
    let config = ModifierConfig::PhyloDistance {
        distances: vec![vec![0.0, 1.0], vec![1.0, 0.0]],
        scale: 1.0,
    };
    let err = config.build(3, 2, false).unwrap_err();
    assert_eq!(err.info().code, "modifier-site-count");

    let config = ModifierConfig::AdjacencyWindow {
        width: 2,
        factor: -1.0,
    };
    assert_eq!(config.build(3, 2, false).unwrap_err().info().code, "adjacency-factor");
}
