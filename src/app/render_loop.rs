use std::time::{Duration, SystemTime};

use calloop::{
    channel::{self, Channel, Event},
    timer::{TimeoutAction, Timer},
    EventLoop,
};
use log::{debug, info, warn};

use super::{
    input::{ButtonPanel, Key},
    lifecycle::{install_shutdown_handler, render_shutdown},
};
use crate::{
    bus::{Bus, BusEvent},
    display::Display,
    menu::{MenuContext, MenuStateMachine},
    pages::PageSet,
    payg::PaygService,
    scheduler::DisplayScheduler,
    Error, Result,
};

const BUTTON_POLL: Duration = Duration::from_millis(20);

/// Everything the loop callbacks receive from other threads.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Bus(BusEvent),
    Key(Key),
}

/// The controller that owns the display.
pub(super) enum Ui {
    Simple(DisplayScheduler),
    FourButton(Box<MenuStateMachine>),
}

/// State owned by the event loop. Every mutation happens inside a loop callback.
pub(super) struct Daemon {
    bus: Box<dyn Bus>,
    pages: PageSet,
    ui: Ui,
    display: Box<dyn Display>,
    payg: PaygService,
    buttons: ButtonPanel,
    tick: Duration,
}

impl Daemon {
    pub(super) fn new(
        bus: Box<dyn Bus>,
        ui: Ui,
        display: Box<dyn Display>,
        buttons: ButtonPanel,
        tick: Duration,
    ) -> Self {
        Self {
            bus,
            pages: PageSet::standard(),
            ui,
            display,
            payg: PaygService::new(),
            buttons,
            tick,
        }
    }

    /// Bind every service already on the bus and put the first screen up.
    pub(super) fn start(&mut self) {
        self.pages.discover(self.bus.as_ref());
        info!("{} pages ready", self.pages.len());
        match &mut self.ui {
            Ui::Simple(scheduler) => {
                scheduler.tick(&mut self.pages, self.bus.as_ref(), self.display.as_mut())
            }
            Ui::FourButton(menu) => {
                let mut ctx = MenuContext {
                    bus: self.bus.as_ref(),
                    pages: &mut self.pages,
                    payg: &self.payg,
                    display: self.display.as_mut(),
                    now: SystemTime::now(),
                };
                menu.start(&mut ctx);
            }
        }
    }

    pub(super) fn tick(&mut self) {
        match &mut self.ui {
            Ui::Simple(scheduler) => {
                scheduler.tick(&mut self.pages, self.bus.as_ref(), self.display.as_mut())
            }
            Ui::FourButton(menu) => {
                let mut ctx = MenuContext {
                    bus: self.bus.as_ref(),
                    pages: &mut self.pages,
                    payg: &self.payg,
                    display: self.display.as_mut(),
                    now: SystemTime::now(),
                };
                menu.tick(&mut ctx, self.tick);
            }
        }
    }

    pub(super) fn key(&mut self, key: Key) {
        debug!("key {key:?}");
        match &mut self.ui {
            Ui::Simple(scheduler) => {
                scheduler.key_pressed(&mut self.pages, self.bus.as_ref(), self.display.as_mut())
            }
            Ui::FourButton(menu) => {
                let mut ctx = MenuContext {
                    bus: self.bus.as_ref(),
                    pages: &mut self.pages,
                    payg: &self.payg,
                    display: self.display.as_mut(),
                    now: SystemTime::now(),
                };
                menu.key_pressed(&mut ctx, key);
            }
        }
    }

    pub(super) fn bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::PropertiesChanged {
                service,
                path,
                value,
            } => self.pages.handle_change(&service, &path, &value),
            BusEvent::NameOwnerChanged {
                name,
                old_owner,
                new_owner,
            } => {
                debug!("owner of {name}: '{old_owner}' -> '{new_owner}'");
                self.pages
                    .owner_changed(self.bus.as_ref(), &name, &old_owner, &new_owner);
            }
        }
    }

    pub(super) fn handle(&mut self, message: Message) {
        match message {
            Message::Bus(event) => self.bus_event(event),
            Message::Key(key) => self.key(key),
        }
    }

    fn poll_buttons(&mut self) {
        for key in self.buttons.poll() {
            self.key(key);
        }
    }

    pub(super) fn shutdown(&mut self) -> Result<()> {
        render_shutdown(self.display.as_mut())
    }
}

/// Run until ctrl-c: a tick timer, a button poll timer, and the message channel.
pub(super) fn run_render_loop(mut daemon: Daemon, messages: Channel<Message>) -> Result<()> {
    let mut event_loop: EventLoop<Daemon> =
        EventLoop::try_new().map_err(|e| Error::EventLoop(e.to_string()))?;
    let handle = event_loop.handle();

    let tick = daemon.tick;
    handle
        .insert_source(Timer::from_duration(tick), move |_, _, daemon: &mut Daemon| {
            daemon.tick();
            TimeoutAction::ToDuration(tick)
        })
        .map_err(|e| Error::EventLoop(e.error.to_string()))?;

    if !daemon.buttons.is_empty() {
        handle
            .insert_source(Timer::from_duration(BUTTON_POLL), |_, _, daemon: &mut Daemon| {
                daemon.poll_buttons();
                TimeoutAction::ToDuration(BUTTON_POLL)
            })
            .map_err(|e| Error::EventLoop(e.error.to_string()))?;
    }

    handle
        .insert_source(messages, |event, _, daemon: &mut Daemon| {
            if let Event::Msg(message) = event {
                daemon.handle(message);
            }
        })
        .map_err(|e| Error::EventLoop(e.error.to_string()))?;

    install_shutdown_handler(event_loop.get_signal())?;

    daemon.start();
    event_loop
        .run(None, &mut daemon, |_| {})
        .map_err(|e| Error::EventLoop(e.to_string()))?;

    if let Err(err) = daemon.shutdown() {
        warn!("shutdown screen failed: {err}");
    }
    Ok(())
}

/// A sender/receiver pair for `Message`s feeding `run_render_loop`.
pub fn message_channel() -> (channel::Sender<Message>, Channel<Message>) {
    channel::channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{memory::MemoryBus, BusValue},
        display::MemoryDisplay,
        scheduler::SchedulerSettings,
    };
    use std::{cell::RefCell, rc::Rc};

    const SYSTEM: &str = "com.victronenergy.system";

    /// Shares one `MemoryDisplay` between the daemon and the test.
    #[derive(Clone)]
    struct SharedDisplay(Rc<RefCell<MemoryDisplay>>);

    impl Display for SharedDisplay {
        fn cols(&self) -> usize {
            self.0.borrow().cols()
        }
        fn clear(&mut self) -> Result<()> {
            self.0.borrow_mut().clear()
        }
        fn home(&mut self) -> Result<()> {
            self.0.borrow_mut().home()
        }
        fn display_string(&mut self, text: &str, row: u8) -> Result<()> {
            self.0.borrow_mut().display_string(text, row)
        }
        fn write(&mut self, text: &str) -> Result<()> {
            self.0.borrow_mut().write(text)
        }
        fn set_backlight(&mut self, on: bool) -> Result<()> {
            self.0.borrow_mut().set_backlight(on)
        }
        fn backlight_on(&self) -> bool {
            self.0.borrow().backlight_on()
        }
        fn on_time(&self) -> Duration {
            self.0.borrow().on_time()
        }
        fn daylight(&self) -> bool {
            self.0.borrow().daylight()
        }
    }

    fn daemon(bus: MemoryBus) -> (Daemon, Rc<RefCell<MemoryDisplay>>) {
        let shared = Rc::new(RefCell::new(MemoryDisplay::new(16, 2)));
        let daemon = Daemon::new(
            Box::new(bus),
            Ui::Simple(DisplayScheduler::new(SchedulerSettings::default())),
            Box::new(SharedDisplay(Rc::clone(&shared))),
            ButtonPanel::default(),
            Duration::from_secs(1),
        );
        (daemon, shared)
    }

    #[test]
    fn startup_binds_services_and_shows_a_page() {
        let bus = MemoryBus::new().with_service(
            SYSTEM,
            [
                ("/Dc/Battery/Soc", BusValue::Double(81.4)),
                ("/Dc/Battery/Power", BusValue::Double(-120.0)),
                ("/Dc/Battery/Voltage", BusValue::Double(52.1)),
            ],
        );
        let (mut daemon, shared) = daemon(bus);
        daemon.start();
        let shown = shared.borrow().lines().join("\n");
        assert!(!shown.trim().is_empty());
    }

    #[test]
    fn property_change_reaches_the_battery_page() {
        let bus =
            MemoryBus::new().with_service(SYSTEM, [("/Dc/Battery/Soc", BusValue::Double(50.0))]);
        let (mut daemon, shared) = daemon(bus);
        daemon.start();
        daemon.handle(Message::Bus(BusEvent::PropertiesChanged {
            service: SYSTEM.into(),
            path: "/Dc/Battery/Soc".into(),
            value: BusValue::Double(64.0),
        }));
        let battery = daemon
            .pages
            .find(crate::pages::PageKey::Battery)
            .expect("battery page");
        assert!(daemon.pages.display(battery, daemon.bus.as_ref(), daemon.display.as_mut()));
        assert!(shared.borrow().line(0).contains("64.0 %"));
    }

    #[test]
    fn shutdown_leaves_offline_message() {
        let (mut daemon, shared) = daemon(MemoryBus::new());
        daemon.start();
        daemon.shutdown().unwrap();
        assert_eq!(shared.borrow().line(0).trim_end(), "offline");
    }
}
