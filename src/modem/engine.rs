//! Transaction engine: one command out, lines in until a terminal status.
//!
//! Every line read while waiting is handed to the dispatcher first, in
//! [`DispatchMode::Deferred`], so unsolicited events keep flowing while a
//! caller blocks. Only after that is the line matched against the
//! caller's [`Expect`] policy.
//!
//! Terminal lines, in priority order:
//!
//! ```text
//!   +CME ERROR: n / +CMS ERROR: n   → Err(AtError::Cme(n))   (any policy)
//!   ERROR / SEND FAIL               → Err(AtError::Rejected) (any policy)
//!   <policy match>                  → Ok(..)
//!   OK                              → Ok(..) unless the policy is a marker
//!   <deadline>                      → Err(AtError::Timeout)
//! ```

use std::string::{String, ToString};
use std::vec::Vec;

use log::debug;

use super::Modem;
use super::dispatch::DispatchMode;
use crate::app::ports::{Clock, SerialPort};
use crate::at::fields;
use crate::error::{AtError, Result};

/// What a transaction waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect<'a> {
    /// Plain `OK`.
    Ok,
    /// A line equal to the token, before any `OK`.
    Line(&'a str),
    /// A line equal to the token; `OK` is not terminal (prompts,
    /// `CONNECT`, results that follow the `OK`).
    Marker(&'a str),
    /// The last line starting with the prefix, terminated by `OK`.
    Field(&'a str),
    /// The first line starting with the prefix; `OK` is not terminal.
    FieldMarker(&'a str),
    /// `OK`; lines the dispatcher did not classify are collected.
    Collect,
}

impl Expect<'_> {
    fn ignores_ok(self) -> bool {
        matches!(self, Self::Marker(_) | Self::FieldMarker(_))
    }
}

/// Result of a successful transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    /// Text after the matched prefix, for the field policies.
    pub payload: Option<String>,
    /// Pass-through lines, for [`Expect::Collect`].
    pub lines: Vec<String>,
}

impl<S: SerialPort, C: Clock> Modem<S, C> {
    /// Run `f` as one transaction: deferred side effects queued while it
    /// runs are executed only after the outermost transaction returns.
    pub(crate) fn in_transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        if self.depth == 0 {
            self.run_deferred();
        }
        out
    }

    pub(crate) fn transact(
        &mut self,
        cmd: Option<&str>,
        expect: Expect<'_>,
        timeout_ms: u32,
    ) -> Result<Reply> {
        self.in_transaction(|m| m.transact_inner(cmd, expect, timeout_ms))
    }

    fn transact_inner(
        &mut self,
        cmd: Option<&str>,
        expect: Expect<'_>,
        timeout_ms: u32,
    ) -> Result<Reply> {
        if let Some(cmd) = cmd {
            debug!(">> {}", cmd);
            self.reader.write_line(cmd)?;
        }

        let deadline = self.clock.now_ms() + u64::from(timeout_ms);
        let mut reply = Reply::default();
        let mut seen = false;

        loop {
            let Some(line) = self.reader.poll_line()? else {
                if self.clock.now_ms() >= deadline {
                    debug!("timeout waiting for {:?}", expect);
                    return Err(AtError::Timeout.into());
                }
                self.clock.delay_ms(self.config.poll_interval_ms);
                continue;
            };

            let classified = self.dispatch(&line, DispatchMode::Deferred);
            let text = line.as_str();

            if let Some(code) = fields::cme_code(text) {
                return Err(AtError::Cme(code).into());
            }
            if text == "ERROR" || text == "SEND FAIL" {
                return Err(AtError::Rejected.into());
            }

            match expect {
                Expect::Line(tok) | Expect::Marker(tok) if text == tok => return Ok(reply),
                Expect::FieldMarker(prefix) => {
                    if let Some(rest) = text.strip_prefix(prefix) {
                        reply.payload = Some(rest.to_string());
                        return Ok(reply);
                    }
                }
                Expect::Field(prefix) => {
                    if let Some(rest) = text.strip_prefix(prefix) {
                        reply.payload = Some(rest.to_string());
                        seen = true;
                    }
                }
                Expect::Collect if !classified && text != "OK" => {
                    reply.lines.push(text.to_string());
                }
                _ => {}
            }

            if text == "OK" && !expect.ignores_ok() {
                return match expect {
                    Expect::Line(_) => Err(AtError::Unexpected.into()),
                    Expect::Field(_) if !seen => {
                        reply.payload = Some(String::new());
                        Ok(reply)
                    }
                    _ => Ok(reply),
                };
            }
            // A steady stream of unrelated lines must not hold the wait open.
            if self.clock.now_ms() >= deadline {
                debug!("timeout waiting for {:?} amid unsolicited traffic", expect);
                return Err(AtError::Timeout.into());
            }
        }
    }

    // ── Public transaction surface ───────────────────────────

    /// Send a command without waiting for anything.
    pub fn send(&mut self, cmd: &str) -> Result<()> {
        debug!(">> {}", cmd);
        self.reader.write_line(cmd)?;
        Ok(())
    }

    /// Succeeds when a line equal to `expect` arrives. `"OK"` means the
    /// ordinary terminal `OK`.
    pub fn check(&mut self, cmd: &str, expect: &str, timeout_ms: u32) -> Result<()> {
        let policy = if expect == "OK" {
            Expect::Ok
        } else {
            Expect::Line(expect)
        };
        self.transact(Some(cmd), policy, timeout_ms).map(|_| ())
    }

    /// Like [`Self::check`], but an intermediate `OK` is not terminal.
    pub fn check_marker(&mut self, cmd: &str, marker: &str, timeout_ms: u32) -> Result<()> {
        self.transact(Some(cmd), Expect::Marker(marker), timeout_ms)
            .map(|_| ())
    }

    /// Text after `prefix` on the last matching line before `OK`; empty if
    /// no line matched.
    pub fn query(&mut self, cmd: &str, prefix: &str, timeout_ms: u32) -> Result<String> {
        let reply = self.transact(Some(cmd), Expect::Field(prefix), timeout_ms)?;
        Ok(reply.payload.unwrap_or_default())
    }

    /// Text after `prefix` on the first matching line; `OK` is ignored.
    pub fn query_marker(&mut self, cmd: &str, prefix: &str, timeout_ms: u32) -> Result<String> {
        let reply = self.transact(Some(cmd), Expect::FieldMarker(prefix), timeout_ms)?;
        Ok(reply.payload.unwrap_or_default())
    }

    /// [`Self::query`] that fails with [`AtError::Unexpected`] on an empty
    /// payload.
    pub fn query_critical(&mut self, cmd: &str, prefix: &str, timeout_ms: u32) -> Result<String> {
        non_empty(self.query(cmd, prefix, timeout_ms)?)
    }

    /// [`Self::query_marker`] that fails with [`AtError::Unexpected`] on an
    /// empty payload.
    pub fn query_marker_critical(
        &mut self,
        cmd: &str,
        prefix: &str,
        timeout_ms: u32,
    ) -> Result<String> {
        non_empty(self.query_marker(cmd, prefix, timeout_ms)?)
    }

    /// Run a command and return the response lines nobody else claimed
    /// (identity strings, listings).
    pub fn exec(&mut self, cmd: &str, timeout_ms: u32) -> Result<Vec<String>> {
        Ok(self.transact(Some(cmd), Expect::Collect, timeout_ms)?.lines)
    }

    /// Wait, without sending, for a line starting with `prefix`.
    pub fn wait_for(&mut self, prefix: &str, timeout_ms: u32) -> Result<String> {
        let reply = self.transact(None, Expect::FieldMarker(prefix), timeout_ms)?;
        Ok(reply.payload.unwrap_or_default())
    }

    /// Wait, without sending, for the terminal `OK`.
    pub(crate) fn wait_ok(&mut self, timeout_ms: u32) -> Result<()> {
        self.transact(None, Expect::Ok, timeout_ms).map(|_| ())
    }

    /// Wait, without sending, for a line equal to `token`.
    pub(crate) fn wait_line(&mut self, token: &str, timeout_ms: u32) -> Result<()> {
        self.transact(None, Expect::Marker(token), timeout_ms)
            .map(|_| ())
    }
}

fn non_empty(payload: String) -> Result<String> {
    if payload.trim().is_empty() {
        Err(AtError::Unexpected.into())
    } else {
        Ok(payload)
    }
}
