use std::sync::{Arc, Mutex};

use vermon::{
    BaseNotifier, ChangeOutcome, Environment, EnvironmentOptions, Filter, MotionDetector, Pipeline,
    Value,
};

fn recorded(detector: &MotionDetector) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    detector.on_has_detected(move |_, new, _| s.lock().unwrap().push(new.clone()));
    seen
}

#[test]
fn environment_high_pass_blocks_before_commit() {
    let env = Environment::new(EnvironmentOptions::default().with_filter(Filter::high_pass(10.0)));
    let changes = Arc::new(Mutex::new(0));
    let c = Arc::clone(&changes);
    env.on_changed_state(move |_, _| *c.lock().unwrap() += 1);

    assert_eq!(env.add_change(5), ChangeOutcome::Blocked);
    assert_eq!(env.current_state(), Value::Number(0.0));
    assert_eq!(*changes.lock().unwrap(), 0);

    assert!(env.add_change(15).is_committed());
    assert_eq!(env.current_state(), Value::Number(15.0));
    assert_eq!(*changes.lock().unwrap(), 1);
}

#[test]
fn detector_high_pass_commits_but_does_not_report() {
    let env = Environment::default();
    let detector = MotionDetector::new("d", 0.0);
    detector.apply_filter(Filter::high_pass(10.0));
    env.bind_detector(&detector);
    detector.start_monitoring();
    let seen = recorded(&detector);

    env.add_change(8);
    assert_eq!(env.current_state(), Value::Number(8.0));
    assert!(seen.lock().unwrap().is_empty());

    env.add_change(30);
    assert_eq!(*seen.lock().unwrap(), vec![Value::Number(38.0)]);
    assert_eq!(detector.count(), 1);
}

#[test]
fn high_and_low_pass_form_a_band() {
    let env = Environment::default();
    let detector = MotionDetector::new("band", 0.0);
    detector.apply_filter(Filter::high_pass(10.0));
    detector.apply_filter(Filter::low_pass(40.0));
    env.bind_detector(&detector);
    detector.start_monitoring();
    let seen = recorded(&detector);

    for delta in [8, 25, 32] {
        env.add_change(delta);
    }

    assert_eq!(*seen.lock().unwrap(), vec![Value::Number(33.0)]);
    assert_eq!(env.current_state(), Value::Number(65.0));
}

#[test]
fn name_filter_silences_only_the_named_detector() {
    let env = Environment::default();
    let muted = MotionDetector::new("muted", 0.0);
    let loud = MotionDetector::new("loud", 0.0);
    muted.apply_filter(Filter::name("muted"));
    loud.apply_filter(Filter::name("muted"));
    for d in [&muted, &loud] {
        env.bind_detector(d);
        d.start_monitoring();
    }

    env.add_change(1);
    assert_eq!(muted.count(), 0);
    assert_eq!(loud.count(), 1);
}

#[test]
fn environment_filters_apply_to_every_detector() {
    let env = Environment::default();
    env.apply_filter(Filter::BlockAll);
    let mut pipeline = Pipeline::new(env.clone());
    let notifier = BaseNotifier::default();
    let stream = notifier.subscribe(4);
    pipeline.add_notifier(notifier);
    pipeline.add_detector(MotionDetector::new("a", 0.0), None).unwrap();
    pipeline.add_detector(MotionDetector::new("b", 0.0), None).unwrap();

    pipeline.add_change(3);
    assert_eq!(env.current_state(), Value::Number(0.0));
    assert!(stream.is_empty());
}

#[test]
fn filters_from_config_json() {
    let high = Filter::try_from(&serde_json::json!({ "HighPassFilter": 10 })).unwrap();
    let tagged = Filter::try_from(&serde_json::json!({ "type": "LowPassFilter", "threshold": 40 })).unwrap();
    assert_eq!(high, Filter::high_pass(10.0));
    assert_eq!(tagged, Filter::low_pass(40.0));

    let err = Filter::try_from(&serde_json::json!({ "notAFilter": 1 })).unwrap_err();
    assert_eq!(err.to_string(), "Binding error: Filter object not of type BaseFilter.");
}

#[test]
fn filterless_changes_accumulate() {
    let env = Environment::new(EnvironmentOptions::default().with_state(1));
    for delta in [2, 3, 4] {
        env.add_change(delta);
    }
    assert_eq!(env.current_state(), Value::Number(10.0));
    assert_eq!(env.original_state(), &Value::Number(1.0));
}
