//! GET-to-file downloads.
//!
//! ```text
//!  http_get_download
//!    AT+QFDEL="<file>"            (stale file, result ignored)
//!    AT+QHTTPURL=<len>,<secs>  → CONNECT → <url> → OK
//!    AT+QHTTPGET=<secs>        → OK           ── job in progress, return
//!  dispatcher
//!    +QHTTPGET: 0,200,<len>    → pending(200, len), queue readback
//!    +QHTTPGET: 0,<other>,<len>→ pending(status, len), failed()
//!    +QHTTPGET: <err>          → failed()
//!    AT+QHTTPREADFILE="<file>",<secs> → OK
//!    +QHTTPREADFILE: 0         → finished()
//!    +QHTTPREADFILE: <err>     → failed()
//!    +CME ERROR while running  → failed()
//! ```
//!
//! One job at a time; a second start is rejected with [`HttpError::Busy`].

use heapless::String;
use log::{info, warn};

use super::{HttpJob, Modem};
use crate::app::ports::{Clock, DownloadObserver, SerialPort};
use crate::at::urc::HttpGet;
use crate::error::{HttpError, Result};
use crate::registry::ContextId;
use crate::transport::LINE_CAPACITY;

impl<S: SerialPort, C: Clock> Modem<S, C> {
    /// Bind the HTTP client to context `cid` and turn off custom headers.
    pub fn http_config(&mut self, cid: u8) -> Result<()> {
        let id = ContextId::try_from(cid)?;
        let timeout = self.config.command_timeout_ms;
        self.check(&format!("AT+QHTTPCFG=\"contextid\",{}", id), "OK", timeout)?;
        self.check("AT+QHTTPCFG=\"responseheader\",0", "OK", timeout)?;
        self.check("AT+QHTTPCFG=\"requestheader\",0", "OK", timeout)
    }

    /// Whether a download job is in progress.
    pub fn http_busy(&self) -> bool {
        self.http.is_some()
    }

    /// Start downloading `url` into the module file `filename`.
    ///
    /// Returns once the GET is accepted; the outcome is reported through
    /// `observer`. A failure before that point is returned as an error and
    /// the observer is never called.
    pub fn http_get_download(
        &mut self,
        url: &str,
        filename: &str,
        observer: Box<dyn DownloadObserver + Send>,
    ) -> Result<()> {
        if self.http.is_some() {
            return Err(HttpError::Busy.into());
        }
        let mut file = String::<64>::new();
        if file.push_str(filename).is_err() || url.len() >= LINE_CAPACITY {
            return Err(HttpError::RequestTooLong.into());
        }

        let cmd_ms = self.config.command_timeout_ms;
        if let Err(e) = self.check(&format!("AT+QFDEL=\"{}\"", file), "OK", cmd_ms) {
            info!("no stale {} to delete ({})", file, e);
        }

        let input_secs = self.config.http_url_input_secs;
        let url_ms = u32::from(input_secs) * 1_000;
        self.in_transaction(|m| {
            m.check_marker(
                &format!("AT+QHTTPURL={},{}", url.len(), input_secs),
                "CONNECT",
                url_ms,
            )
            .map_err(|e| {
                warn!("no CONNECT for url upload: {}", e);
                HttpError::NoConnectPrompt
            })?;
            m.reader.write_raw(url.as_bytes())?;
            m.wait_ok(url_ms)
        })?;

        let get_secs = self.config.http_get_secs;
        self.check(&format!("AT+QHTTPGET={}", get_secs), "OK", cmd_ms)?;

        info!("http download of {} into {} started", url, file);
        self.http = Some(HttpJob {
            filename: file,
            content_length: 0,
            observer,
        });
        Ok(())
    }

    fn finish_job(&mut self, ok: bool) {
        if let Some(mut job) = self.http.take() {
            if ok {
                info!("http download into {} finished ({} bytes)", job.filename, job.content_length);
                job.observer.finished();
            } else {
                warn!("http download into {} failed", job.filename);
                job.observer.failed();
            }
        }
    }

    pub(crate) fn on_http_get(&mut self, get: HttpGet) {
        let Some(job) = self.http.as_mut() else {
            warn!("http result without a job");
            return;
        };
        match get {
            HttpGet::Response {
                err: 0,
                status: Some(status),
                content_length,
            } => {
                job.content_length = content_length;
                job.observer.pending(status, content_length);
                if status == 200 {
                    self.defer(super::dispatch::Deferred::HttpReadback);
                } else {
                    warn!("http status {}", status);
                    self.finish_job(false);
                }
            }
            HttpGet::Response { err, .. } => {
                warn!("http get error {}", err);
                self.finish_job(false);
            }
            HttpGet::Malformed => self.finish_job(false),
        }
    }

    pub(crate) fn on_http_readfile(&mut self, err: Option<u16>) {
        if self.http.is_none() {
            return;
        }
        if err != Some(0) {
            warn!("http readfile error {:?}", err);
        }
        self.finish_job(err == Some(0));
    }

    pub(crate) fn on_http_error(&mut self, code: u16) {
        warn!("CME error {} during http download", code);
        self.finish_job(false);
    }

    /// Ask the module to write the response body to the job's file.
    pub(crate) fn http_readback(&mut self) {
        let Some(job) = self.http.as_ref() else {
            return;
        };
        let cmd = format!(
            "AT+QHTTPREADFILE=\"{}\",{}",
            job.filename, self.config.http_readfile_secs
        );
        let timeout = self.config.command_timeout_ms;
        if let Err(e) = self.check(&cmd, "OK", timeout) {
            warn!("http readback failed: {}", e);
            self.finish_job(false);
        }
    }
}
