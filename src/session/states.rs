//! States for the `rzflash` session state machine.
//!
//! This modules is private and restricted to the [`session`](crate::session)
//! scope. Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::fmt;

use console::style;
use log::{error, info};

use super::events::*;
use crate::{
    backend::FlashingBackend,
    error::{FlashError, Result},
    link::SerialLink,
    protocol::{deploy_system_image, flash_bootloader},
    settings::{Operation, Settings},
    utils::check_images,
};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Opens the serial link for a session.
pub(crate) type Connect = Box<dyn FnOnce(&Settings) -> Result<Box<dyn SerialLink>>>;

/// Data shared by all states for the whole session.
pub(crate) struct Context {
    pub settings: Settings,
    pub operation: Operation,
    pub backend: Box<dyn FlashingBackend>,
}
impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("settings", &self.settings)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done and
    /// when finished, requests a transition to a `new state` by returning the
    /// appropriate `event`.
    fn run(&mut self, context: &mut Context) -> Event;
}

// Init State ==================================================================

/// The initial state of the session.
///
/// Checks that every image the operation needs is on disk, then opens the
/// serial link. Nothing is sent to the board from here.
///
///  * **[`FlashBootloaderEvent`] => [`FlashBootloaderState`]** when the
///    operation includes the bootloader,
///  * **[`DeploySystemImageEvent`] => [`DeploySystemImageState`]** for a
///    rootfs only operation,
///  * **[`DoneEvent`] => [`DoneState`]** when an image is missing or the link
///    cannot be opened.
pub(crate) struct InitState {
    /// Consumed when the link is opened.
    pub connect: Option<Connect>,
}
impl Runnable for InitState {
    fn run(&mut self, context: &mut Context) -> Event {
        info!("=> Init ({:?})", context.operation);

        if let Err(e) = check_images(
            &context.settings.images,
            &context.operation.required_images(),
        ) {
            return Event::Done(DoneEvent { error: Some(e) });
        }

        let connect = match self.connect.take() {
            Some(connect) => connect,
            // We should never reach here!
            None => unreachable!("the serial link can only be opened once"),
        };
        match connect(&context.settings) {
            Ok(link) if context.operation.flashes_bootloader() => {
                Event::FlashBootloader(FlashBootloaderEvent { link })
            }
            Ok(link) => Event::DeploySystemImage(DeploySystemImageEvent { link }),
            Err(e) => Event::Done(DoneEvent { error: Some(e) }),
        }
    }
}
impl fmt::Debug for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitState")
            .field("connected", &self.connect.is_none())
            .finish()
    }
}

// FlashBootloader State =======================================================

/// Writes the Flash Writer, bl2 and FIP images.
///
///  * **[`DeploySystemImageEvent`] => [`DeploySystemImageState`]** after the
///    bootloader is written, for a full flash,
///  * **[`DoneEvent`] => [`DoneState`]** otherwise, or on error.
pub(crate) struct FlashBootloaderState {
    /// Consumed and moved upon the transition to the next state.
    pub link: Option<Box<dyn SerialLink>>,
}
impl Runnable for FlashBootloaderState {
    fn run(&mut self, context: &mut Context) -> Event {
        info!("=> Flash Bootloader ({})", context.settings.target);

        if let Some(mut link) = self.link.take() {
            return match flash_bootloader(link.as_mut(), &context.settings) {
                Ok(()) if context.operation.deploys_rootfs() => {
                    Event::DeploySystemImage(DeploySystemImageEvent { link })
                }
                Ok(()) => Event::Done(DoneEvent { error: None }),
                Err(e) => Event::Done(DoneEvent { error: Some(e) }),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}
impl_debug_with_link!(state FlashBootloaderState);

// DeploySystemImage State =====================================================

/// Brings the board to fastboot and flashes the rootfs image.
///
///  * **[`DoneEvent`] => [`DoneState`]** in all cases.
pub(crate) struct DeploySystemImageState {
    pub link: Option<Box<dyn SerialLink>>,
}
impl Runnable for DeploySystemImageState {
    fn run(&mut self, context: &mut Context) -> Event {
        info!("=> Deploy System Image");

        if let Some(mut link) = self.link.take() {
            let result = deploy_system_image(
                link.as_mut(),
                context.backend.as_mut(),
                &context.settings,
            );
            return Event::Done(DoneEvent { error: result.err() });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl_debug_with_link!(state DeploySystemImageState);

// Done State ==================================================================

/// Reached when the session completes its execution and is about to
/// terminate (normally or abnormally).
///
/// This state goes into a 2-phase execution. During the initial phase, it runs
/// like any other state to report the outcome. It then triggers the
/// [`ExitEvent`] to cause the session state machine to terminate and exit.
#[derive(Debug)]
pub(crate) struct DoneState {
    /// Set when the session stopped on an error.
    pub error: Option<FlashError>,
    /// When `true` instructs the session state machine to exit its event loop.
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, _context: &mut Context) -> Event {
        info!(
            "=> Done with{}errors",
            if self.error.is_some() { " " } else { " no " }
        );

        if let Some(e) = &self.error {
            error!("{:?}", e);
            eprintln!("{}", style(format!("[RZ] 💥 Error: {}", e)).red());
            eprintln!("[RZ] 🔌 Check power, boot strapping and cabling, then run again.");
        }

        Event::Exit(ExitEvent {
            error: self.error.take(),
        })
    }
}
