use std::time::Duration;

use super::*;
use crate::{
    actuator::HoldTimings,
    test_support::{registry, RecordingActuator},
};
use tokio::time::sleep;

const SHORT: Duration = Duration::from_millis(100);
const LONG: Duration = Duration::from_millis(300);

async fn scheduler(
    actuator: Arc<RecordingActuator>,
) -> (Arc<CommandScheduler>, broadcast::Receiver<EngineEvent>) {
    let (events, rx) = broadcast::channel(64);
    let registry = registry(&["a", "b", "c", "up"]);
    let gateway = ActuatorGateway::new(
        Arc::clone(&registry),
        actuator,
        HoldTimings {
            short: SHORT,
            long: LONG,
        },
        events.clone(),
    );
    (CommandScheduler::start(registry, gateway, events).await, rx)
}

#[tokio::test(start_paused = true)]
async fn immediate_commands_press_without_waiting_for_release() {
    let actuator = RecordingActuator::new();
    let (scheduler, _rx) = scheduler(actuator.clone()).await;

    scheduler.enqueue_command("a").await.expect("a");
    scheduler.enqueue_command("b").await.expect("b");
    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        actuator.history(),
        vec![
            (Duration::ZERO, 0b01),
            (Duration::ZERO, 0b11),
            (SHORT, 0b10),
            (SHORT, 0b00),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn plan_presses_strictly_in_order_without_overlap() {
    let actuator = RecordingActuator::new();
    let (scheduler, _rx) = scheduler(actuator.clone()).await;
    scheduler.set_sequential_mode(true).await;

    scheduler
        .enqueue_sequence(vec!["a".into(), "b".into(), "c".into()])
        .await
        .expect("plan");
    sleep(Duration::from_secs(2)).await;

    let history = actuator.history();
    assert_eq!(
        history.iter().map(|(_, mask)| *mask).collect::<Vec<_>>(),
        vec![0b001, 0, 0b010, 0, 0b100, 0]
    );
    assert!(history.iter().all(|(_, mask)| mask.count_ones() <= 1));
    assert_eq!(history[5].0, SHORT * 3);
}

#[tokio::test(start_paused = true)]
async fn plans_wait_while_sequential_mode_is_off() {
    let actuator = RecordingActuator::new();
    let (scheduler, _rx) = scheduler(actuator.clone()).await;

    scheduler
        .enqueue_sequence(vec!["a".into()])
        .await
        .expect("plan");
    sleep(Duration::from_secs(1)).await;
    assert!(actuator.history().is_empty());
    assert_eq!(scheduler.depths().await.plans, 1);
}

#[tokio::test(start_paused = true)]
async fn turning_sequential_off_abandons_queued_plans() {
    let actuator = RecordingActuator::new();
    let (scheduler, _rx) = scheduler(actuator.clone()).await;

    scheduler
        .enqueue_sequence(vec!["a".into()])
        .await
        .expect("plan");
    scheduler.set_sequential_mode(false).await;
    scheduler.set_sequential_mode(true).await;
    sleep(Duration::from_secs(1)).await;

    assert!(actuator.history().is_empty());
    assert_eq!(scheduler.depths().await, LaneDepths::default());
}

#[tokio::test(start_paused = true)]
async fn immediate_lane_drains_before_the_next_plan() {
    let actuator = RecordingActuator::new();
    let (scheduler, mut rx) = scheduler(actuator.clone()).await;

    scheduler
        .enqueue_sequence(vec!["a".into()])
        .await
        .expect("plan");
    scheduler.enqueue_command("up").await.expect("up");
    scheduler.set_sequential_mode(true).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(
        rx.recv().await.expect("event"),
        EngineEvent::CommandPressed { token: "up".into() }
    );
    assert_eq!(
        rx.recv().await.expect("event"),
        EngineEvent::PlanStarted {
            tokens: vec!["a".into()]
        }
    );
    assert_eq!(actuator.masks()[..2].to_vec(), vec![0b1000u32, 0b1001]);
}

#[tokio::test(start_paused = true)]
async fn rejects_unknown_tokens_and_partial_plans() {
    let actuator = RecordingActuator::new();
    let (scheduler, _rx) = scheduler(actuator.clone()).await;
    scheduler.set_sequential_mode(true).await;

    assert!(matches!(
        scheduler.enqueue_command("jump").await,
        Err(ControlError::UnknownCommand { .. })
    ));
    assert!(scheduler
        .enqueue_sequence(vec!["a".into(), "jump".into()])
        .await
        .is_err());
    sleep(Duration::from_secs(1)).await;

    assert!(actuator.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_worker_and_refuses_new_work() {
    let actuator = RecordingActuator::new();
    let (scheduler, _rx) = scheduler(actuator.clone()).await;

    scheduler.shutdown().await;

    assert!(matches!(
        scheduler.enqueue_command("a").await,
        Err(ControlError::SchedulerClosed)
    ));
}
