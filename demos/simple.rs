use pickpick::{ContainerConfig, Experiment, ExperimentDefinition, Payload, Targeting, Visitor};
use serde_json::json;

pub fn main() -> pickpick::Result<()> {
    // Configure env_logger to see pick logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("pickpick")).init();

    let button_color = Experiment::create(ExperimentDefinition {
        id: "953d6fe0".to_owned(),
        name: Some("buy page button color experiment".to_owned()),
        variations: vec![
            json!({"object": "#ff0000", "weight": 4}).into(),
            json!({"object": "#ff0000", "weight": 1}).into(),
            json!({"object": "#00ff00", "weight": 1}).into(),
        ],
        targeting: Targeting::expression(r#"_.page in ["buy", "index"]"#)?,
        ..Default::default()
    })?;

    let price = Experiment::from_json(&json!({
        "id": "a40f09ac",
        "name": "buy page price experiment",
        "variations": [{"object": 25}, {"object": 35}, {"object": 45}],
        "targeting": r#"_.page !== "home" && _.page !== "about""#
    }))?;

    let greeting = Experiment::from_json(&json!({
        "id": "ac49ef42",
        "name": "index text experiment",
        "variations": [{"object": "hi"}, {"object": "hello"}, {"object": "welcome"}],
        "targeting": {"page": "index"}
    }))?;

    let container = ContainerConfig::new()
        .experiments([button_color, price, greeting])
        .to_container()?;

    // A visitor that needs to know which variation of which experiment it gets.
    let visitor = Visitor::from([("page".to_owned(), "index".into())]);
    for _ in 0..10 {
        let Some(experiment) = container.pick(&visitor)? else {
            // No experiment targets this visitor, fall back to defaults.
            println!("default goes here");
            continue;
        };

        println!("selected experiment '{}'", experiment.name());
        match experiment.pick() {
            Payload::Value(value) => println!("selected variation is {value}"),
            Payload::Experiment(nested) => println!("selected nested experiment '{}'", nested.name()),
        }
    }

    Ok(())
}
