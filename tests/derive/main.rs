//! Tests for the `ModelObject` derive macro.

use serde::{Deserialize, Serialize};
use survey_model::{InMemoryStore, ModelConfig, ModelObject, ObjectType, ProjectBinding, Registry, Store};

#[derive(Debug, Clone, PartialEq, ModelObject)]
#[model(object_type = "plan")]
struct SurveyPlan {
    name: String,
}

#[derive(Debug, Clone, PartialEq, ModelObject)]
struct SonarParams {
    gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ModelObject)]
enum SurveyObject {
    #[model(object_type = "plan")]
    Plan { name: String },
    Track(String),
    SensorOffsets,
}

#[test]
fn struct_uses_attribute() {
    let plan = SurveyPlan { name: "north".into() };
    assert_eq!(plan.object_type(), ObjectType::from("plan"));
    assert_eq!(plan.name, "north");
}

#[test]
fn struct_defaults_to_snake_case() {
    assert_eq!(SonarParams { gain: 1.0 }.object_type(), ObjectType::from("sonar_params"));
}

#[test]
fn enum_variants_are_types() {
    assert_eq!(
        SurveyObject::Plan { name: "a".into() }.object_type(),
        ObjectType::from("plan")
    );
    assert_eq!(SurveyObject::Track("t".into()).object_type(), ObjectType::from("track"));
    assert_eq!(SurveyObject::SensorOffsets.object_type(), ObjectType::from("sensor_offsets"));
}

#[test]
fn derived_enum_drives_a_model() {
    let store = InMemoryStore::<SurveyObject>::new(["plan", "track", "sensor_offsets"]);
    let project = ProjectBinding::new("memory://", "survey");
    store.create_project(&project);

    let model = Registry::new()
        .store(store.clone())
        .register(ModelConfig::default())
        .unwrap();
    model.set_project(project);

    let id = model.add(SurveyObject::Track("line-1".into())).unwrap();
    assert_eq!(
        model.get(&"track".into(), &id),
        Some(SurveyObject::Track("line-1".into()))
    );

    // Shutdown drains the queue into the connected store.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !model.is_connected(&"track".into()) && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    model.shutdown();
    assert_eq!(
        store.get(&"track".into(), &id).unwrap(),
        Some(SurveyObject::Track("line-1".into()))
    );
}
