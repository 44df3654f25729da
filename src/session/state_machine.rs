//! `rzflash` session state machine.
//!
//! A session takes the board through the parts of the flashing process the
//! selected [`Operation`] asks for, sharing one serial link between them. The
//! link is opened once, after the images were found, and handed from state to
//! state through the transition events. It is closed when the session reaches
//! `Done`, whatever the outcome.
//!
//! ```text
//!                 START
//!                   |
//!                   v
//!              .--------.  missing image /
//!              |  Init  |-----------------------------.
//!              '--------'  port error                 |
//!          bootloader |    \ rootfs                   |
//!            or full  v     '---------------.         |
//!    .-----------------.                    v         v
//!    | FlashBootloader |--full-->.-------------------.  .------.
//!    '-----------------'         | DeploySystemImage |->| Done |
//!            |                   '-------------------'  '------'
//!            |   bootloader only / error                   ^
//!            '---------------------------------------------'
//! ```

use super::events::*;
use super::states::*;
use crate::{
    backend::{FastbootBackend, FlashingBackend},
    error::Result,
    link::SerialLink,
    settings::{Operation, Settings},
    utils::open_and_setup_port,
};

// =============================================================================
// Public Interface
// =============================================================================

/// Represents one flashing run. Use the [`factory()`] function to get an
/// instance then run it by calling its `run()` method.
pub struct Session {
    sm: SessionStates,
}
impl Session {
    /// The session event loop runs until the `Done` state is reached and its
    /// `should_exit` flag is set. At such point, the event loop terminates and
    /// returns the error that stopped the session, if any.
    pub fn run(mut self) -> Result<()> {
        loop {
            self.sm = self.sm.step();
            if let SessionStates::Done(sm) = &mut self.sm {
                if sm.state.should_exit {
                    return match sm.state.error.take() {
                        Some(e) => Err(e),
                        None => Ok(()),
                    };
                }
            }
        }
    }
}

/// Factory function for a session on the serial port described in
/// `settings`, flashing the rootfs with the `fastboot` client found in the
/// settings' tool directory.
pub fn factory(settings: Settings, operation: Operation) -> Session {
    let backend = FastbootBackend::new(settings.tool_dir.clone());
    factory_with(
        settings,
        operation,
        Box::new(|settings: &Settings| -> Result<Box<dyn SerialLink>> {
            Ok(Box::new(open_and_setup_port(settings)?))
        }),
        Box::new(backend),
    )
}

/// Same as [`factory()`], with the way the serial link is opened and the
/// backend used to flash the rootfs provided by the caller.
pub fn factory_with(
    settings: Settings,
    operation: Operation,
    connect: Box<dyn FnOnce(&Settings) -> Result<Box<dyn SerialLink>>>,
    backend: Box<dyn FlashingBackend>,
) -> Session {
    Session {
        sm: SessionStates::Init(SessionSM {
            context: Context {
                settings,
                operation,
                backend,
            },
            state: InitState {
                connect: Some(connect),
            },
        }),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine of a session.
///
/// The generic type holding the current state lets all states share the
/// session [`Context`] while keeping their own data.
#[derive(Debug)]
struct SessionSM<S: Runnable> {
    context: Context,
    state: S,
}
impl<S: Runnable> SessionSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&mut self.context)
    }
}

/// An enum wrapper around the states of the session state machine.
enum SessionStates {
    Init(SessionSM<InitState>),
    FlashBootloader(SessionSM<FlashBootloaderState>),
    DeploySystemImage(SessionSM<DeploySystemImageState>),
    Done(SessionSM<DoneState>),
}
impl SessionStates {
    /// The unit of work in the state machine event loop. It runs the current
    /// state and decides the next transition from the event it returns. State
    /// transitions from events are implemented using the rust `From`/`Into`
    /// pattern, so only the transitions listed below can ever happen.
    fn step(self) -> Self {
        match self {
            SessionStates::Init(mut sm) => {
                let event = sm.run();
                match event {
                    Event::FlashBootloader(ev) => {
                        SessionStates::FlashBootloader((sm.context, ev).into())
                    }
                    Event::DeploySystemImage(ev) => {
                        SessionStates::DeploySystemImage((sm.context, ev).into())
                    }
                    Event::Done(ev) => SessionStates::Done((sm.context, ev).into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::FlashBootloader(mut sm) => {
                let event = sm.run();
                match event {
                    Event::DeploySystemImage(ev) => {
                        SessionStates::DeploySystemImage((sm.context, ev).into())
                    }
                    Event::Done(ev) => SessionStates::Done((sm.context, ev).into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::DeploySystemImage(mut sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => SessionStates::Done((sm.context, ev).into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Done(mut sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => SessionStates::Done((sm.context, ev).into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<(Context, FlashBootloaderEvent)> for SessionSM<FlashBootloaderState> {
    fn from((context, event): (Context, FlashBootloaderEvent)) -> Self {
        SessionSM {
            context,
            state: FlashBootloaderState {
                link: Some(event.link),
            },
        }
    }
}

impl From<(Context, DeploySystemImageEvent)> for SessionSM<DeploySystemImageState> {
    fn from((context, event): (Context, DeploySystemImageEvent)) -> Self {
        SessionSM {
            context,
            state: DeploySystemImageState {
                link: Some(event.link),
            },
        }
    }
}

impl From<(Context, DoneEvent)> for SessionSM<DoneState> {
    fn from((context, event): (Context, DoneEvent)) -> Self {
        SessionSM {
            context,
            state: DoneState {
                error: event.error,
                should_exit: false,
            },
        }
    }
}
impl From<(Context, ExitEvent)> for SessionSM<DoneState> {
    fn from((context, event): (Context, ExitEvent)) -> Self {
        SessionSM {
            context,
            state: DoneState {
                error: event.error,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
