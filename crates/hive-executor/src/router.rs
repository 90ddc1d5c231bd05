//! Executor-side dispatcher.
//!
//! Reads envelopes from the channel, invokes the engine, and writes one
//! response per request. Synchronous commands are answered before the next
//! envelope is read; `open` and `includeJs` hand back a completion that is
//! awaited on its own task, so a slow navigation never holds up other
//! commands.

use futures_util::{FutureExt, TryFutureExt};
use hive_channel::{Channel, Inbound};
use hive_types::{
    EntityId, Envelope, HiveError, PageCommand, PageRef, Script, SessionCommand, SessionId,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::engine::{Completion, Engine, EngineError, EnginePage, EventSink};
use crate::props;
use crate::registry::PageTable;

/// Whether the dispatcher should keep reading after an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// `done` was received; the executor should terminate.
    Done,
}

/// Result of dispatching one page command.
enum Outcome {
    Ready(Result<Vec<Value>, EngineError>),
    Deferred(Completion<Vec<Value>>),
}

pub struct Router<E: Engine> {
    session: SessionId,
    engine: E,
    pages: PageTable<E::Page>,
    channel: Channel,
    next_page: u64,
}

impl<E: Engine> std::fmt::Debug for Router<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("session", &self.session)
            .field("pages", &self.pages.ids())
            .field("next_page", &self.next_page)
            .finish_non_exhaustive()
    }
}

impl<E: Engine> Router<E> {
    pub fn new(session: SessionId, engine: E, channel: Channel) -> Self {
        Self {
            session,
            engine,
            pages: PageTable::new(),
            channel,
            next_page: 0,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Ids of the live pages.
    pub fn pages(&self) -> Vec<EntityId> {
        self.pages.ids()
    }

    /// Process envelopes until `done` arrives or the channel closes.
    pub async fn run(mut self, mut inbound: Inbound) -> Result<(), HiveError> {
        info!(session = %self.session, "dispatcher started");
        while let Some(envelope) = inbound.recv().await {
            if self.handle(envelope)? == Flow::Done {
                info!(session = %self.session, "done received");
                self.close_pages();
                return Ok(());
            }
        }
        info!(session = %self.session, "channel closed");
        self.close_pages();
        Ok(())
    }

    /// Dispatch one envelope.
    ///
    /// Engine failures are answered with a faulted response and never stop
    /// the dispatcher. An error return is fatal: the channel is gone or the
    /// page id space has been corrupted.
    pub fn handle(&mut self, envelope: Envelope) -> Result<Flow, HiveError> {
        if envelope.is_event() {
            warn!(command = %envelope.command, "dropping event sent to the executor");
            return Ok(Flow::Continue);
        }
        match envelope.page.clone() {
            PageRef::Session(id) => {
                if id != self.session {
                    warn!(
                        session = %id,
                        command = %envelope.command,
                        "dropping envelope for a foreign session"
                    );
                    return Ok(Flow::Continue);
                }
                match SessionCommand::from_name(&envelope.command) {
                    Some(command) => self.session_command(command, envelope),
                    None => {
                        warn!(command = %envelope.command, "unknown session command");
                        Ok(Flow::Continue)
                    }
                }
            }
            PageRef::Entity(id) => {
                match PageCommand::from_name(&envelope.command) {
                    Some(command) => self.page_command(id, command, envelope)?,
                    None => warn!(page = id.0, command = %envelope.command, "unknown page command"),
                }
                Ok(Flow::Continue)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Session commands
    // -----------------------------------------------------------------------

    fn session_command(
        &mut self,
        command: SessionCommand,
        envelope: Envelope,
    ) -> Result<Flow, HiveError> {
        let name = command.as_str();
        let args = envelope.args.as_slice();
        let engine = &mut self.engine;
        let result = match command {
            SessionCommand::CreatePage => {
                self.create_page(&envelope)?;
                return Ok(Flow::Continue);
            }
            SessionCommand::InjectJs => props::batch(name, args, |path| {
                let path = path_arg(name, path)?;
                Ok(json!(engine.inject_js(path)?))
            }),
            SessionCommand::AddCookie => {
                props::batch(name, args, |cookie| Ok(json!(engine.add_cookie(cookie)?)))
            }
            SessionCommand::DeleteCookie => props::batch(name, args, |cookie| {
                let name = cookie_name(name, cookie)?;
                Ok(json!(engine.delete_cookie(name)?))
            }),
            SessionCommand::ClearCookies => engine.clear_cookies().map(|()| Vec::new()),
            SessionCommand::Get => props::get(&*engine, name, args),
            SessionCommand::Set => props::set(engine, name, args).map(|()| Vec::new()),
            SessionCommand::Exit => {
                self.close_pages();
                Ok(Vec::new())
            }
            SessionCommand::Done => return Ok(Flow::Done),
        };
        self.respond(&envelope, result)?;
        Ok(Flow::Continue)
    }

    fn create_page(&mut self, envelope: &Envelope) -> Result<(), HiveError> {
        self.next_page += 1;
        let id = EntityId(self.next_page);
        let events = EventSink::new(id, self.channel.clone());
        match self.engine.create_page(events) {
            Ok(page) => {
                self.pages.insert(id, page)?;
                info!(page = id.0, "page created");
                self.send(envelope.reply(vec![json!(id.0)]))
            }
            Err(e) => self.respond(envelope, Err(e)),
        }
    }

    /// Close every live page, in id order.
    fn close_pages(&mut self) {
        for (id, mut page) in self.pages.drain() {
            if let Err(e) = page.close() {
                warn!(page = id.0, error = %e, "page close failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Page commands
    // -----------------------------------------------------------------------

    fn page_command(
        &mut self,
        id: EntityId,
        command: PageCommand,
        envelope: Envelope,
    ) -> Result<(), HiveError> {
        let outcome = if matches!(command, PageCommand::Close | PageCommand::Release) {
            match self.pages.remove(id) {
                Some(mut page) => dispatch(&mut page, command, &envelope.args),
                None => return self.unknown_page(id, &envelope),
            }
        } else {
            match self.pages.get_mut(id) {
                Some(page) => dispatch(page, command, &envelope.args),
                None => return self.unknown_page(id, &envelope),
            }
        };
        match outcome {
            Outcome::Ready(result) => self.respond(&envelope, result),
            Outcome::Deferred(done) => {
                self.defer(envelope, done);
                Ok(())
            }
        }
    }

    fn unknown_page(&self, id: EntityId, envelope: &Envelope) -> Result<(), HiveError> {
        warn!(page = id.0, command = %envelope.command, "dropping envelope for an unknown page");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Responses
    // -----------------------------------------------------------------------

    fn respond(
        &self,
        request: &Envelope,
        result: Result<Vec<Value>, EngineError>,
    ) -> Result<(), HiveError> {
        let response = match result {
            Ok(args) => request.reply(args),
            Err(e) => {
                warn!(
                    page = %request.page,
                    command = %request.command,
                    error = %e,
                    "command failed"
                );
                request.fault(e.to_string())
            }
        };
        self.send(response)
    }

    /// Answer `request` once `done` resolves.
    fn defer(&self, request: Envelope, done: Completion<Vec<Value>>) {
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let response = match done.await {
                Ok(args) => request.reply(args),
                Err(e) => {
                    warn!(
                        page = %request.page,
                        command = %request.command,
                        error = %e,
                        "command failed"
                    );
                    request.fault(e.to_string())
                }
            };
            if channel.send(response).is_err() {
                debug!("response dropped, channel closed");
            }
        });
    }

    fn send(&self, envelope: Envelope) -> Result<(), HiveError> {
        self.channel.send(envelope)
    }

    #[cfg(test)]
    pub(crate) fn rewind_page_ids(&mut self, next: u64) {
        self.next_page = next;
    }
}

fn dispatch<P: EnginePage>(page: &mut P, command: PageCommand, args: &[Value]) -> Outcome {
    let name = command.as_str();
    let result = match command {
        PageCommand::Open => {
            return match props::str_arg(name, args, 0) {
                Ok(url) => {
                    let done = page.open(url).map_ok(|status| vec![json!(status)]);
                    Outcome::Deferred(done.boxed())
                }
                Err(e) => Outcome::Ready(Err(e)),
            };
        }
        PageCommand::IncludeJs => {
            return match props::str_arg(name, args, 0) {
                Ok(url) => {
                    let done = page.include_js(url).map_ok(|()| Vec::new());
                    Outcome::Deferred(done.boxed())
                }
                Err(e) => Outcome::Ready(Err(e)),
            };
        }
        PageCommand::AddCookie => {
            props::batch(name, args, |cookie| Ok(json!(page.add_cookie(cookie)?)))
        }
        PageCommand::DeleteCookie => props::batch(name, args, |cookie| {
            let cookie = cookie_name(name, cookie)?;
            Ok(json!(page.delete_cookie(cookie)?))
        }),
        PageCommand::ClearCookies => page.clear_cookies().map(|()| Vec::new()),
        PageCommand::Close | PageCommand::Release => page.close().map(|()| Vec::new()),
        PageCommand::Evaluate => props::str_arg(name, args, 0).and_then(|source| {
            let script = Script::new(source);
            page.evaluate(&script, &args[1..]).map(|value| vec![value])
        }),
        PageCommand::EvaluateAsync => props::str_arg(name, args, 0)
            .and_then(|source| page.evaluate_async(&Script::new(source)))
            .map(|()| Vec::new()),
        PageCommand::InjectJs => props::batch(name, args, |path| {
            let path = path_arg(name, path)?;
            Ok(json!(page.inject_js(path)?))
        }),
        PageCommand::Render => props::str_arg(name, args, 0)
            .and_then(|path| page.render(path))
            .map(|()| Vec::new()),
        PageCommand::RenderBase64 => {
            let format = match args.first() {
                None | Some(Value::Null) => Ok("png"),
                Some(_) => props::str_arg(name, args, 0),
            };
            format
                .and_then(|format| page.render_base64(format))
                .map(|data| vec![json!(data)])
        }
        PageCommand::SendEvent => props::str_arg(name, args, 0)
            .and_then(|kind| page.send_event(kind, &args[1..]))
            .map(|()| Vec::new()),
        PageCommand::UploadFile => props::str_arg(name, args, 0)
            .and_then(|selector| {
                let path = props::str_arg(name, args, 1)?;
                page.upload_file(selector, path)
            })
            .map(|()| Vec::new()),
        PageCommand::Get => props::get(&*page, name, args),
        PageCommand::Set => props::set(page, name, args).map(|()| Vec::new()),
    };
    Outcome::Ready(result)
}

fn path_arg<'a>(command: &str, value: &'a Value) -> Result<&'a str, EngineError> {
    value
        .as_str()
        .ok_or_else(|| {
            EngineError::invalid(command, format!("expected a script path, got {value}"))
        })
}

/// A cookie to delete is named either directly or by a cookie object.
fn cookie_name<'a>(command: &str, value: &'a Value) -> Result<&'a str, EngineError> {
    match value {
        Value::String(name) => Ok(name),
        Value::Object(cookie) => cookie
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::invalid(command, "cookie without a name")),
        other => Err(EngineError::invalid(command, format!("expected a cookie name, got {other}"))),
    }
}
