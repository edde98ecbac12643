// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cooperative cancellation for long-running passes.  The render loop
//! polls a checker between rows; whoever owns the token can ask it to
//! stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything the render loop can poll to learn it should stop.
pub trait Cancellation {
    /// True once the computation should be abandoned.
    fn is_cancelled(&self) -> bool;
}

/// Never cancels.  Used for one-off renders and benchmarks.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A shareable one-way switch.  Clones observe the same flag; once
/// cancelled a token stays cancelled, so every job gets a fresh one.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Ask every holder of this token to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Cancellation for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
