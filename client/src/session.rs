//! Session driver: sequences exchanges over one channel and decides
//! which failures are fatal in which mode.

use crate::channel::{ChannelError, QueryChannel, TerminationPolicy};
use log::error;
use shared::Query;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// One resolved endpoint, one socket, one password, reused across every
/// command of the program run.
pub struct Session {
    channel: QueryChannel,
    password: String,
}

impl Session {
    /// Resolves the server once and opens the channel. Any failure here
    /// is a configuration error and fatal in both modes.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        timeout: Duration,
        policy: TerminationPolicy,
    ) -> Result<Self, ChannelError> {
        let channel = QueryChannel::connect(host, port, timeout, policy).await?;
        Ok(Session {
            channel,
            password: password.to_string(),
        })
    }

    /// Runs one execute-command exchange and returns the collected lines.
    pub async fn run_command(&mut self, command: &str) -> Result<Vec<String>, ChannelError> {
        let query = Query::rcon_command(&self.password, command);
        self.channel.exchange(&query).await
    }

    /// One-shot mode: a single exchange, lines printed to stdout. Any
    /// channel error propagates and the process exits non-zero.
    pub async fn run_once(&mut self, command: &str) -> Result<(), ChannelError> {
        for line in self.run_command(command).await? {
            println!("{}", line);
        }
        Ok(())
    }

    /// Interactive mode: prompt, read one operator line, exchange, print,
    /// repeat until stdin is exhausted. Per-command failures are reported
    /// and the loop continues; the session ends on end of input (quietly)
    /// or on a failure to read it (reported).
    pub async fn run_interactive(&mut self) -> Result<(), ChannelError> {
        self.run_loop(BufReader::new(tokio::io::stdin())).await
    }

    async fn run_loop<R>(&mut self, input: R) -> Result<(), ChannelError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        prompt();
        loop {
            let command = match lines.next_line().await {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            };
            match self.run_command(&command).await {
                Ok(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                Err(e) => error!("Command failed: {}", e),
            }
            prompt();
        }
        Ok(())
    }
}

fn prompt() {
    print!(">>> ");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    /// Connects to a port nobody listens on, so every exchange just times
    /// out empty.
    async fn session_to_silent_port() -> Session {
        let target = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = target.local_addr().unwrap().port();
        drop(target);
        Session::connect(
            "127.0.0.1",
            port,
            "secret",
            TIMEOUT,
            TerminationPolicy::InactivityOnly,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn interactive_loop_ends_on_eof() {
        let mut session = session_to_silent_port().await;
        let input = BufReader::new(&b"gmx\n"[..]);
        session.run_loop(input).await.unwrap();
    }

    /// A failure to read operator input ends the loop cleanly instead of
    /// hanging or panicking; it is reported, not propagated.
    #[tokio::test]
    async fn interactive_loop_ends_on_input_error() {
        let mut session = session_to_silent_port().await;
        let broken = tokio_test::io::Builder::new()
            .read(b"gmx\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::Other, "tty gone"))
            .build();
        session.run_loop(BufReader::new(broken)).await.unwrap();
    }
}
