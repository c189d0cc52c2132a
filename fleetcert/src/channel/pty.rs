//! PTY channel for interactive device sessions.

use std::time::Duration;

use log::trace;
use regex::bytes::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::buffer::PromptBuffer;
use crate::error::{ChannelError, Result, TransportError};

/// Interactive shell channel with prompt-based reads.
///
/// Wraps an open russh shell channel and accumulates its output in a
/// [`PromptBuffer`] until a prompt pattern shows up in the tail.
pub struct PtyChannel {
    channel: Channel<Msg>,
    buffer: PromptBuffer,
}

impl PtyChannel {
    /// Wrap a channel that already has a PTY and shell.
    pub fn new(channel: Channel<Msg>, search_depth: usize) -> Self {
        Self {
            channel,
            buffer: PromptBuffer::new(search_depth),
        }
    }

    /// Send a line of input, terminated with a newline.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        let data = format!("{line}\n");
        self.channel
            .data(data.as_bytes())
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }

    /// Read until `pattern` matches the tail of the accumulated output.
    ///
    /// Returns everything read, including the matched prompt.
    pub async fn read_until(&mut self, pattern: &Regex, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + timeout;

        while !self.buffer.tail_matches(pattern) {
            let msg = tokio::time::timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| ChannelError::PatternTimeout(timeout))?;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    trace!("pty read {} bytes", data.len());
                    self.buffer.push(&data);
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => self.buffer.push(&data),
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed.into());
                }
                Some(_) => {}
            }
        }

        Ok(self.buffer.take())
    }

    /// Read until either of two patterns matches; returns which one did.
    pub async fn read_until_either(
        &mut self,
        first: &Regex,
        second: &Regex,
        timeout: Duration,
    ) -> Result<(Vec<u8>, bool)> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.buffer.tail_matches(first) {
                return Ok((self.buffer.take(), true));
            }
            if self.buffer.tail_matches(second) {
                return Ok((self.buffer.take(), false));
            }

            let msg = tokio::time::timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| ChannelError::PatternTimeout(timeout))?;

            match msg {
                Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. }) => {
                    self.buffer.push(&data);
                }
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed.into());
                }
                Some(_) => {}
            }
        }
    }

    /// Close the channel.
    pub async fn close(self) -> Result<()> {
        self.channel.close().await.map_err(TransportError::Ssh)?;
        Ok(())
    }
}
