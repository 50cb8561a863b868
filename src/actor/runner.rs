//! Actor thread: reactor-driven request serving and polling.
//!
//! Runs in a dedicated thread using `edge-executor` for cooperative
//! scheduling and `async-io-mini` for reactor timers. Two futures share
//! the actor:
//!
//! 1. **Requests** wake on `REQUEST_CHANNEL.receive().await` and run one
//!    request to completion.
//! 2. **Poll** ticks the modem every `poll_period`.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────┐
//!  │  modem thread                                    │
//!  │  ┌────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor              │  │
//!  │  │  ┌────────────────┐  ┌──────────────────┐  │  │
//!  │  │  │ request_loop   │  │ poll_loop        │  │  │
//!  │  │  │ wake-on-send   │  │ poll_period ⏱    │  │  │
//!  │  │  └────────────────┘  └──────────────────┘  │  │
//!  │  └────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! Both futures borrow the actor only between awaits, so a request and a
//! tick never overlap.

use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;

use log::info;

use super::ModemActor;
use super::channels::REQUEST_CHANNEL;
use crate::app::ports::{Clock, SerialPort};

/// Stack for the modem thread.
pub const STACK_SIZE: usize = 16 * 1024;

type SharedActor<S, C> = Rc<RefCell<ModemActor<S, C>>>;

async fn request_loop<S: SerialPort, C: Clock>(actor: SharedActor<S, C>) {
    loop {
        let req = REQUEST_CHANNEL.receive().await;
        actor.borrow_mut().serve(req);
    }
}

async fn poll_loop<S: SerialPort, C: Clock>(actor: SharedActor<S, C>, period: Duration) {
    loop {
        actor.borrow_mut().tick();
        async_io_mini::Timer::after(period).await;
    }
}

/// Drive `actor` forever on the calling thread.
pub fn run<S: SerialPort, C: Clock>(actor: ModemActor<S, C>, poll_period: Duration) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let actor: SharedActor<S, C> = Rc::new(RefCell::new(actor));

    executor.spawn(request_loop(actor.clone())).detach();
    executor.spawn(poll_loop(actor.clone(), poll_period)).detach();

    info!("modem actor started (poll every {:?})", poll_period);
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Spawn the actor on a dedicated `modem` thread.
pub fn spawn<S, C>(
    actor: ModemActor<S, C>,
    poll_period: Duration,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    S: SerialPort + Send + 'static,
    C: Clock + Send + 'static,
{
    std::thread::Builder::new()
        .name("modem".into())
        .stack_size(STACK_SIZE)
        .spawn(move || run(actor, poll_period))
}
