use crate::config::schema::ClassificationRule;
use crate::models::MissionType;

/// Rules every classifier starts from unless `use_builtin_rules` is off.
pub fn builtin_rules() -> Vec<ClassificationRule> {
    let mut box_rule = ClassificationRule::new("box_directory", MissionType::Box);
    box_rule.directory_patterns = vec!["box".into(), "container".into(), "cargo".into()];
    box_rule.filename_patterns = vec!["box".into(), "container".into()];
    box_rule.altitude_range = Some((5.0, 50.0));
    box_rule.duration_range = Some((30.0, 300.0));
    box_rule.base_confidence = 0.7;

    let mut safety_rule = ClassificationRule::new("safety_directory", MissionType::Safety);
    safety_rule.directory_patterns =
        vec!["safety".into(), "inspection".into(), "hazard".into()];
    safety_rule.filename_patterns = vec![
        "safety".into(),
        "inspection".into(),
        "hazard".into(),
        "check".into(),
    ];
    safety_rule.altitude_range = Some((2.0, 30.0));
    safety_rule.duration_range = Some((60.0, 600.0));
    safety_rule.base_confidence = 0.7;

    // Bay names such as 8B-7F or 8D are upper-case by convention.
    let mut bay_rule = ClassificationRule::new("bay_box", MissionType::Box);
    bay_rule.directory_patterns = vec![
        r"(?-i)^\d+[A-Z]-\d+[A-Z]$".into(),
        r"(?-i)^\d+[A-Z]$".into(),
    ];
    bay_rule.base_confidence = 0.5;
    bay_rule.pattern_weight = 0.6;

    vec![box_rule, safety_rule, bay_rule]
}
