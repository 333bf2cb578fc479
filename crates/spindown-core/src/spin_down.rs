//! Per-device spin-down state machine and delay strategies.
//!
//! A controller has two states: ACTIVE (no pending timer) and ARMED (timer
//! pending). An idle edge arms a one-shot actuation timer with the delay the
//! configured strategy supplies; an active edge or a device removal cancels
//! it. When the timer fires, the actuator runs and the controller returns to
//! ACTIVE without re-arming.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::activity::DiskActivityObserver;
use crate::duration;
use crate::error::Error;
use crate::scheduler::{Scheduler, TimerId};

/// Supplies the delay between an idle edge and actuation.
///
/// Pluggable so alternative policies (time-of-day windows, load-aware
/// back-off) can slot in without touching the controller.
pub trait SpinDownStrategy: std::fmt::Debug {
    fn spin_down_delay(&self) -> Duration;
}

/// Strategy options as read from configuration.
pub type StrategyOptions = HashMap<String, String>;

/// Build a strategy from its configured name and options.
///
/// The only shipped strategy is `"idle"`, a fixed delay after the idle edge.
pub fn create_strategy(
    name: &str,
    options: &StrategyOptions,
) -> Result<Box<dyn SpinDownStrategy>, Error> {
    match name {
        "idle" => {
            let delay = options.get("delay").ok_or_else(|| {
                Error::Configuration(
                    "spin down strategy \"idle\" requires a \"delay\" option".to_string(),
                )
            })?;
            Ok(Box::new(IdleStrategy {
                delay: duration::parse(delay)?,
            }))
        }
        other => Err(Error::Configuration(format!(
            "unknown spin down strategy \"{other}\""
        ))),
    }
}

/// Fixed idle delay.
#[derive(Debug)]
struct IdleStrategy {
    delay: Duration,
}

impl SpinDownStrategy for IdleStrategy {
    fn spin_down_delay(&self) -> Duration {
        self.delay
    }
}

/// Performs the spin-down action when the controller's timer fires.
pub type SpinDownActuator = Box<dyn FnMut()>;

/// One-shot delayed actuation controller for a single device.
pub struct DiskSpinDownController {
    device_name: String,
    strategy: Box<dyn SpinDownStrategy>,
    actuator: SpinDownActuator,
    scheduler: Scheduler,
    timer_id: Option<TimerId>,
    weak_self: Weak<RefCell<Self>>,
}

impl DiskSpinDownController {
    pub fn new(
        device_name: String,
        strategy: Box<dyn SpinDownStrategy>,
        actuator: SpinDownActuator,
        scheduler: &Scheduler,
    ) -> Rc<RefCell<Self>> {
        let controller = Rc::new(RefCell::new(Self {
            device_name,
            strategy,
            actuator,
            scheduler: scheduler.clone(),
            timer_id: None,
            weak_self: Weak::new(),
        }));
        controller.borrow_mut().weak_self = Rc::downgrade(&controller);
        controller
    }

    fn on_timer(&mut self) {
        self.timer_id = None;
        log::info!("Spinning down {}", self.device_name);
        (self.actuator)();
    }

    fn cancel_timer(&mut self) {
        if let Some(timer_id) = self.timer_id.take() {
            self.scheduler.clear_timer(timer_id);
        }
    }
}

impl DiskActivityObserver for DiskSpinDownController {
    fn on_disk_active(&mut self) {
        log::debug!("{} is active", self.device_name);
        self.cancel_timer();
    }

    fn on_disk_idle(&mut self) {
        log::debug!("{} is idle", self.device_name);
        // Edge-triggered notifications never repeat an idle edge, but stay
        // sound if a caller violates that contract.
        if self.timer_id.is_some() {
            return;
        }
        let delay = self.strategy.spin_down_delay();
        let weak = self.weak_self.clone();
        self.timer_id = Some(self.scheduler.set_timer(
            delay,
            Box::new(move || {
                if let Some(controller) = weak.upgrade() {
                    controller.borrow_mut().on_timer();
                }
            }),
        ));
    }

    fn on_disk_removed(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fixed(delay: Duration) -> Box<dyn SpinDownStrategy> {
        Box::new(IdleStrategy { delay })
    }

    fn counting_actuator() -> (SpinDownActuator, Rc<RefCell<u32>>) {
        let calls = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&calls);
        (Box::new(move || *counter.borrow_mut() += 1), calls)
    }

    #[test]
    fn idle_then_timeout_actuates_once() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(20)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        scheduler.run();
        assert_eq!(*calls.borrow(), 1);
        assert!(controller.borrow().timer_id.is_none());
    }

    #[test]
    fn activity_before_timeout_cancels_actuation() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(50)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        // Activity arrives well before the 50ms deadline.
        let racer = Rc::clone(&controller);
        scheduler.set_timer(
            Duration::from_millis(5),
            Box::new(move || racer.borrow_mut().on_disk_active()),
        );

        scheduler.run();
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn active_without_pending_timer_is_noop() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(5)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_active();
        controller.borrow_mut().on_disk_active();
        scheduler.run();
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn repeated_idle_does_not_rearm() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(10)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        let first_timer = controller.borrow().timer_id;
        controller.borrow_mut().on_disk_idle();
        assert_eq!(controller.borrow().timer_id, first_timer);

        scheduler.run();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn removal_cancels_pending_timer() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(10)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        controller.borrow_mut().on_disk_removed();
        scheduler.run();
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn idle_again_after_firing_rearms() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(5)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        scheduler.run();
        assert_eq!(*calls.borrow(), 1);

        controller.borrow_mut().on_disk_idle();
        scheduler.run();
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn actuation_waits_for_strategy_delay() {
        let scheduler = Scheduler::new();
        let (actuator, _calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(40)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        let started = Instant::now();
        scheduler.run();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn dropped_controller_never_actuates() {
        let scheduler = Scheduler::new();
        let (actuator, calls) = counting_actuator();
        let controller = DiskSpinDownController::new(
            "sda".to_string(),
            fixed(Duration::from_millis(5)),
            actuator,
            &scheduler,
        );

        controller.borrow_mut().on_disk_idle();
        drop(controller);
        scheduler.run();
        assert_eq!(*calls.borrow(), 0);
    }

    // -----------------------------------------------------------------------
    // Strategy factory
    // -----------------------------------------------------------------------

    fn options(pairs: &[(&str, &str)]) -> StrategyOptions {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn idle_strategy_uses_configured_delay() {
        let strategy = create_strategy("idle", &options(&[("delay", "10m")])).unwrap();
        assert_eq!(strategy.spin_down_delay(), Duration::from_secs(600));
    }

    #[test]
    fn idle_strategy_requires_delay_option() {
        assert!(create_strategy("idle", &StrategyOptions::new()).is_err());
    }

    #[test]
    fn idle_strategy_rejects_bad_delay() {
        assert!(create_strategy("idle", &options(&[("delay", "whenever")])).is_err());
    }

    #[test]
    fn unknown_strategy_is_a_configuration_error() {
        let error = create_strategy("lunar_phase", &StrategyOptions::new()).unwrap_err();
        assert!(error.to_string().contains("lunar_phase"));
    }
}
