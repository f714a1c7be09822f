//! Headless session runner.
//!
//! Wraps a [`SessionDriver`] and speaks the JSON-lines protocol. Two loops
//! are provided: [`HeadlessRunner::run_script`] applies commands as fast as
//! they arrive and never looks at the wall clock, while
//! [`HeadlessRunner::run_realtime`] paces frames at the configured rate
//! and feeds real elapsed time to the driver.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use serf_core::driver::{DriverStats, FrameReport, SessionDriver};
use serf_core::persistence::Persistence;
use serf_core::session::Session;

use crate::config::HeadlessConfig;
use crate::error::Result;
use crate::protocol::{Command, Response, StateReport};
use crate::store::FileStore;

/// Headless runner for scripted or real-time play.
#[derive(Debug)]
pub struct HeadlessRunner<P: Persistence> {
    driver: SessionDriver<P>,
    auto_state: bool,
    frame_duration: Duration,
    max_duration: Option<Duration>,
}

impl HeadlessRunner<FileStore> {
    /// Runner with a fresh session saving into the configured directory.
    pub fn from_config(config: &HeadlessConfig) -> Result<Self> {
        let session = Session::new(&config.session)?;
        let store = FileStore::new(&config.save_dir).with_label(config.save_label.clone());
        Ok(Self::new(SessionDriver::new(session, store), config))
    }
}

impl<P: Persistence> HeadlessRunner<P> {
    /// Runner around an existing driver. Only the loop settings of
    /// `config` are used.
    #[must_use]
    pub fn new(driver: SessionDriver<P>, config: &HeadlessConfig) -> Self {
        Self {
            driver,
            auto_state: config.auto_state,
            frame_duration: config.frame_duration(),
            max_duration: config.max_duration(),
        }
    }

    /// The driver.
    #[must_use]
    pub const fn driver(&self) -> &SessionDriver<P> {
        &self.driver
    }

    /// Mutable driver.
    pub fn driver_mut(&mut self) -> &mut SessionDriver<P> {
        &mut self.driver
    }

    /// Give back the driver.
    #[must_use]
    pub fn into_driver(self) -> SessionDriver<P> {
        self.driver
    }

    /// Parse one input line and execute it.
    ///
    /// Blank lines produce no output; malformed lines produce an error
    /// response and leave the session untouched.
    pub fn handle_line(&mut self, line: &str) -> Vec<Response> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        match Command::from_json(line) {
            Ok(command) => self.execute(command),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable command");
                vec![Response::error(format!("Parse error: {e}"), None)]
            }
        }
    }

    /// Execute one command and collect its responses.
    pub fn execute(&mut self, command: Command) -> Vec<Response> {
        let name = command.name();
        tracing::debug!(cmd = name, "Executing command");

        let response = match command {
            Command::Tick { count } => Response::ticked(self.driver.run_ticks(count)),
            Command::Frames { count, frame_ms } => {
                let frame = Duration::from_millis(frame_ms);
                let mut total = FrameReport::default();
                for _ in 0..count {
                    merge_report(&mut total, self.driver.advance_frame(frame));
                }
                Response::ticked(total)
            }
            Command::Query => Response::State(StateReport::of(self.driver.session())),
            Command::Hash => Response::StateHash {
                tick: self.driver.session().clock().tick(),
                hash: self.driver.session().state_hash(),
            },
            Command::Save => match self.driver.save_now() {
                Ok(path) => Response::Saved {
                    path: path.display().to_string(),
                },
                Err(e) => command_error(name, &e),
            },
            Command::Load { path } => match self.driver.load(Path::new(&path)) {
                Ok(()) => Response::Loaded {
                    tick: self.driver.session().clock().tick(),
                    path,
                },
                Err(e) => command_error(name, &e),
            },
            Command::Autosave { enabled } => {
                self.driver.set_autosave(enabled);
                Response::ack(name)
            }
            other => match other.to_driver() {
                Some(driver_command) => match self.driver.handle(driver_command) {
                    Ok(()) => Response::ack(name),
                    Err(e) => command_error(name, &e),
                },
                None => Response::error("Command not handled", Some(name)),
            },
        };

        let mut responses = vec![response];
        if self.auto_state
            && !self.driver.should_quit()
            && !matches!(responses[0], Response::State(_))
        {
            responses.push(Response::State(StateReport::of(self.driver.session())));
        }
        responses
    }

    /// Apply every line of `input` in order, without wall-clock pacing.
    ///
    /// Stops at `quit` or end of input and returns the run totals.
    pub fn run_script<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<DriverStats> {
        emit(out, &[Response::ready(self.driver.session())])?;
        for line in input.lines() {
            let responses = self.handle_line(&line?);
            emit(out, &responses)?;
            if self.driver.should_quit() {
                break;
            }
        }
        self.finish(out)
    }

    /// Run frames at the configured rate, applying command lines from
    /// `commands` between frames.
    ///
    /// Stops at `quit`, when the duration limit is reached, or when the
    /// input closes and no duration limit is set.
    pub fn run_realtime<W: Write>(
        &mut self,
        commands: &Receiver<String>,
        out: &mut W,
    ) -> Result<DriverStats> {
        emit(out, &[Response::ready(self.driver.session())])?;
        tracing::info!(
            frame_ms = self.frame_duration.as_millis() as u64,
            limit_secs = self.max_duration.map(|d| d.as_secs()),
            "Real-time loop started"
        );

        let start = Instant::now();
        let mut last_frame = start;
        let mut input_open = true;

        'frames: loop {
            let frame_start = Instant::now();

            while input_open {
                match commands.try_recv() {
                    Ok(line) => {
                        let responses = self.handle_line(&line);
                        emit(out, &responses)?;
                        if self.driver.should_quit() {
                            break 'frames;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::debug!("Command input closed");
                        input_open = false;
                    }
                }
            }
            if !input_open && self.max_duration.is_none() {
                break;
            }

            let now = Instant::now();
            let report = self.driver.advance_frame(now - last_frame);
            last_frame = now;
            if report.ticks > 0 && self.auto_state {
                emit(out, &[Response::State(StateReport::of(self.driver.session()))])?;
            }

            if self.max_duration.is_some_and(|limit| start.elapsed() >= limit) {
                tracing::info!("Duration limit reached");
                break;
            }

            let spent = frame_start.elapsed();
            if spent < self.frame_duration {
                thread::sleep(self.frame_duration - spent);
            }
        }

        self.finish(out)
    }

    fn finish<W: Write>(&mut self, out: &mut W) -> Result<DriverStats> {
        let stats = self.driver.stats();
        tracing::info!(
            frames = stats.frames,
            ticks = stats.ticks,
            autosaves = stats.autosaves,
            "Runner finished"
        );
        emit(out, &[Response::Bye { stats }])?;
        Ok(stats)
    }
}

/// Forward stdin lines to a channel from a background thread.
///
/// The channel closes when stdin reaches end of file.
#[must_use]
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

fn merge_report(total: &mut FrameReport, frame: FrameReport) {
    total.ticks += frame.ticks;
    total.redraw |= frame.redraw;
    total.autosaves += frame.autosaves;
    total.autosave_failures += frame.autosave_failures;
}

fn command_error(name: &str, error: &serf_core::error::GameError) -> Response {
    tracing::warn!(cmd = name, error = %error, "Command failed");
    Response::error(error.to_string(), Some(name))
}

fn emit<W: Write>(out: &mut W, responses: &[Response]) -> io::Result<()> {
    for response in responses {
        out.write_all(response.to_json_line().as_bytes())?;
    }
    out.flush()
}
