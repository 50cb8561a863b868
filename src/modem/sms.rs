//! SMS in text mode (`AT+CMGF=1`, set by `configure`).

use heapless::{String, Vec};
use log::{debug, info, warn};

use super::Modem;
use crate::app::ports::{Clock, SerialPort};
use crate::at::fields::{self, num, unquote};
use crate::error::Result;

/// Messages handled per listing.
pub const MAX_SMS: usize = 10;

const LIST_TIMEOUT_MS: u32 = 10_000;
const SEND_TIMEOUT_MS: u32 = 60_000;
const DELETE_TIMEOUT_MS: u32 = 7_000;
const CTRL_Z: u8 = 0x1a;

/// One stored message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsMessage {
    /// Storage index, for [`Modem::sms_remove`].
    pub index: u8,
    pub origin: String<32>,
    pub text: String<256>,
}

impl<S: SerialPort, C: Clock> Modem<S, C> {
    /// List every stored message (`AT+CMGL="ALL"`).
    pub fn read_sms(&mut self) -> Result<Vec<SmsMessage, MAX_SMS>> {
        let lines = self.exec("AT+CMGL=\"ALL\"", LIST_TIMEOUT_MS)?;
        Ok(parse_listing(lines.iter().map(|l| l.as_str())))
    }

    /// Send `text` to `number`.
    pub fn sms_send(&mut self, number: &str, text: &str) -> Result<()> {
        let cmd = format!("AT+CMGS=\"{}\"", number);
        self.in_transaction(|m| {
            m.check_marker(&cmd, ">", SEND_TIMEOUT_MS)?;
            m.reader.write_raw(text.as_bytes())?;
            m.reader.write_raw(&[CTRL_Z])?;
            m.wait_ok(SEND_TIMEOUT_MS)
        })?;
        info!("sms sent to {}", number);
        Ok(())
    }

    /// Delete the message stored at `index`.
    pub fn sms_remove(&mut self, index: u8) -> Result<()> {
        self.check(&format!("AT+CMGD={}", index), "OK", DELETE_TIMEOUT_MS)
    }

    /// List stored messages and hand each one to the SMS handler.
    pub(crate) fn deliver_sms(&mut self) -> Result<()> {
        if self.sms_handler.is_none() {
            debug!("sms arrived, no handler registered");
            return Ok(());
        }
        let messages = self.read_sms()?;
        if let Some(handler) = self.sms_handler.as_mut() {
            for msg in &messages {
                handler(msg);
            }
        }
        Ok(())
    }
}

/// `+CMGL: <idx>,"<stat>","<origin>",...` followed by one text line.
fn parse_listing<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<SmsMessage, MAX_SMS> {
    let mut out = Vec::new();
    let mut current: Option<SmsMessage> = None;

    for line in lines {
        if let Some(params) = line.strip_prefix("+CMGL:") {
            if let Some(done) = current.take() {
                push(&mut out, done);
            }
            current = header(params.trim_start());
            continue;
        }
        if let Some(msg) = current.as_mut() {
            if !msg.text.is_empty() && msg.text.push('\n').is_err() {
                continue;
            }
            for c in line.chars() {
                if msg.text.push(c).is_err() {
                    warn!("sms {} text truncated", msg.index);
                    break;
                }
            }
        }
    }
    if let Some(done) = current {
        push(&mut out, done);
    }
    out
}

fn header(params: &str) -> Option<SmsMessage> {
    let mut f = fields::split(params);
    let index = num(f.next()?)?;
    let mut msg = SmsMessage {
        index,
        ..SmsMessage::default()
    };
    let origin = unquote(f.nth(1).unwrap_or_default());
    if msg.origin.push_str(origin).is_err() {
        warn!("sms {} origin too long", index);
    }
    Some(msg)
}

fn push(out: &mut Vec<SmsMessage, MAX_SMS>, msg: SmsMessage) {
    if out.push(msg).is_err() {
        warn!("more than {} sms stored, rest ignored", MAX_SMS);
    }
}
