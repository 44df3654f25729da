//! Events for the `rzflash` session state machine.
//!
//! This modules is private and restricted to the [`session`](crate::session)
//! scope. Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use crate::{error::FlashError, link::SerialLink};

// =============================================================================
// Crate-Public Interface
// =============================================================================

// FlashBootloaderEvent ========================================================

/// Event fired to trigger a transition to
/// [`FlashBootloaderState`](super::states::FlashBootloaderState).
///
/// Only fired from the `Init` state, once the images are known to be there and
/// the serial link is open, when the operation includes the bootloader.
pub(crate) struct FlashBootloaderEvent {
    /// The serial link to be used in the next state. Consumed and moved to the
    /// next state.
    pub link: Box<dyn SerialLink>,
}
impl_debug_with_link!(event FlashBootloaderEvent);

// DeploySystemImageEvent ======================================================

/// Event fired to trigger a transition to
/// [`DeploySystemImageState`](super::states::DeploySystemImageState).
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the `Init` state, for an operation that only deploys the
///     rootfs.
///  2. While at the `FlashBootloader` state, after the bootloader chain was
///     written, for a full flash.
pub(crate) struct DeploySystemImageEvent {
    pub link: Box<dyn SerialLink>,
}
impl_debug_with_link!(event DeploySystemImageEvent);

// DoneEvent ===================================================================

/// Event fired when the session completes, normally or on the first error. It
/// triggers a transition to the `Done` state and releases the serial link.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub error: Option<FlashError>,
}

// ExitEvent ===================================================================

/// The last event of a session. The event loop terminates and hands the
/// outcome back to the caller.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub error: Option<FlashError>,
}

// Events enum ==================================================================

/// Events that can be triggered within the session state machine.
///
/// Each possible value holds an `event`, which in turn may hold additional data
/// for the state transition.
#[derive(Debug)]
pub(crate) enum Event {
    FlashBootloader(FlashBootloaderEvent),
    DeploySystemImage(DeploySystemImageEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
