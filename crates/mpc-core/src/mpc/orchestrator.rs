//! Message routing and completion tracking for a set of local engines

use super::{LocalProtocolEngine, Outbox};
use crate::{Error, PartyIdentity, PeerContext, ProtocolMessage, Result};
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, info_span, instrument, warn, Span};

type Inbox = mpsc::UnboundedSender<ProtocolMessage>;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Running,
    Completed,
    Failed,
}

/// Terminal result reported by one party
#[derive(Debug, Clone)]
pub struct Completion<O> {
    pub party: PartyIdentity,
    pub output: O,
}

/// Drives a set of engines to a single converged outcome
///
/// Each engine is moved onto its own blocking worker with a dedicated inbound
/// queue. A single coordinating loop owns all routing decisions and reads
/// three streams: outgoing messages, errors and terminal results. The run
/// completes once every engine has reported a result and fails on the first
/// error.
pub struct Orchestrator<E: LocalProtocolEngine> {
    engines: Vec<E>,
    context: PeerContext,
    deadline: Option<Duration>,
    state: RunState,
}

impl<E: LocalProtocolEngine> Orchestrator<E> {
    /// Check that all engines share one peer context and cover it exactly
    pub fn new(engines: Vec<E>) -> Result<Self> {
        let context = engines
            .first()
            .map(|e| e.peer_context().clone())
            .ok_or_else(|| Error::InvalidConfig("No engines to orchestrate".into()))?;
        context.validate()?;

        if engines.len() != context.len() {
            return Err(Error::InvalidConfig(format!(
                "{} engines for {} parties",
                engines.len(),
                context.len()
            )));
        }

        let mut seen = HashSet::with_capacity(engines.len());
        for engine in &engines {
            if !engine.peer_context().same_instance(&context) {
                return Err(Error::InvalidConfig(format!(
                    "Engine for party {} uses a different peer context",
                    engine.identity()
                )));
            }
            if !context.contains(engine.identity()) {
                return Err(Error::InvalidConfig(format!(
                    "Party {} is not in the peer context",
                    engine.identity()
                )));
            }
            if !seen.insert(engine.identity().clone()) {
                return Err(Error::InvalidConfig(format!(
                    "More than one engine for party {}",
                    engine.identity()
                )));
            }
        }

        Ok(Self {
            engines,
            context,
            deadline: None,
            state: RunState::Initialized,
        })
    }

    /// Bound the run; `None` waits indefinitely
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every engine to completion
    ///
    /// `on_complete` sees each party's result once, in arrival order; an
    /// error from it fails the run. It runs on the coordinating task and
    /// blocks routing while it executes, so it should stay short (a small
    /// file write at most). A run can only be executed once.
    #[instrument(skip_all, fields(parties = self.context.len()))]
    pub async fn run<F>(&mut self, mut on_complete: F) -> Result<Vec<Completion<E::Output>>>
    where
        F: FnMut(&PartyIdentity, &E::Output) -> Result<()>,
    {
        if self.state != RunState::Initialized {
            return Err(Error::Internal(format!(
                "Run cannot be restarted from state {:?}",
                self.state
            )));
        }
        self.state = RunState::Running;

        let expected = self.engines.len();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ProtocolMessage>();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<Error>();
        let (end_tx, mut end_rx) = mpsc::unbounded_channel::<(PartyIdentity, E::Output)>();

        let mut inboxes: HashMap<PartyIdentity, Inbox> = HashMap::with_capacity(expected);
        let mut workers = JoinSet::new();
        let span = Span::current();

        for engine in self.engines.drain(..) {
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let identity = engine.identity().clone();
            inboxes.insert(identity.clone(), in_tx);

            let outbox = Outbox::new(identity, out_tx.clone(), end_tx.clone());
            let err_tx = err_tx.clone();
            let span = span.clone();
            workers.spawn_blocking(move || drive_engine(engine, outbox, in_rx, err_tx, span));
        }
        drop((out_tx, err_tx, end_tx));

        info!(expected, "Parties started");

        let deadline = self.deadline;
        let timer = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        let mut finished = HashSet::with_capacity(expected);
        let mut completions = Vec::with_capacity(expected);

        let result = loop {
            tokio::select! {
                Some(err) = err_rx.recv() => {
                    error!(error = %err, "Party reported an error");
                    break Err(err);
                }

                Some(message) = out_rx.recv() => {
                    if let Err(err) = route(&inboxes, message) {
                        error!(error = %err, "Routing failed");
                        break Err(err);
                    }
                }

                Some((party, output)) = end_rx.recv() => {
                    if !finished.insert(party.clone()) {
                        warn!(party = %party, "Ignoring repeated result");
                        continue;
                    }
                    if let Err(err) = on_complete(&party, &output) {
                        break Err(err);
                    }
                    completions.push(Completion { party, output });
                    info!(done = completions.len(), expected, "Party finished");

                    if completions.len() == expected {
                        break Ok(());
                    }
                }

                Some(joined) = workers.join_next() => {
                    if let Err(err) = joined {
                        break Err(Error::Internal(format!("Party worker died: {}", err)));
                    }
                }

                _ = &mut timer, if deadline.is_some() => {
                    break Err(Error::Timeout(format!(
                        "{} of {} parties to finish",
                        expected - completions.len(),
                        expected
                    )));
                }

                else => {
                    break Err(Error::Internal("All parties stopped before finishing".into()));
                }
            }
        };

        // Closing the inbound queues lets every worker run out
        drop(inboxes);

        match result {
            Ok(()) => {
                while let Some(joined) = workers.join_next().await {
                    if let Err(err) = joined {
                        warn!(error = %err, "Party worker failed after completion");
                    }
                }
                self.state = RunState::Completed;
                info!("Run completed");
                Ok(completions)
            }
            Err(err) => {
                workers.abort_all();
                self.state = RunState::Failed;
                Err(err)
            }
        }
    }
}

/// Deliver one outgoing message according to its addressing
fn route(inboxes: &HashMap<PartyIdentity, Inbox>, message: ProtocolMessage) -> Result<()> {
    match message.recipient() {
        None => {
            let from = message.sender().clone();
            debug!(from = %from, round = message.round(), "Broadcast");
            for (party, inbox) in inboxes {
                if *party == from {
                    continue;
                }
                deliver(party, inbox, message.clone())?;
            }
            Ok(())
        }
        Some(to) => {
            let to = to.clone();
            let inbox = inboxes.get(&to).ok_or_else(|| Error::UnknownRecipient {
                from: message.sender().to_string(),
                to: to.to_string(),
            })?;
            if to == *message.sender() {
                debug!(party = %to, "Skipping self-addressed message");
                return Ok(());
            }
            debug!(from = %message.sender(), to = %to, round = message.round(), "Direct");
            deliver(&to, inbox, message)
        }
    }
}

fn deliver(party: &PartyIdentity, inbox: &Inbox, message: ProtocolMessage) -> Result<()> {
    inbox
        .send(message)
        .map_err(|_| Error::Internal(format!("Inbound queue of party {} is closed", party)))
}

/// Worker body: start the engine, then apply inbound messages in order until
/// the queue closes or the engine fails
fn drive_engine<E: LocalProtocolEngine>(
    mut engine: E,
    outbox: Outbox<E::Output>,
    mut inbox: mpsc::UnboundedReceiver<ProtocolMessage>,
    errors: mpsc::UnboundedSender<Error>,
    parent: Span,
) {
    let span = info_span!(parent: &parent, "party", index = engine.identity().index());
    let _enter = span.enter();

    if let Err(err) = engine.start(&outbox) {
        let _ = errors.send(err);
        return;
    }

    while let Some(message) = inbox.blocking_recv() {
        if let Err(err) = engine.update(&message, &outbox) {
            let _ = errors.send(err);
            return;
        }
    }
    debug!("Inbound queue closed");
}
