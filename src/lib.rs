pub mod codec;
pub mod report;
pub mod source;
pub mod verify;

use self::codec::{FrameCodec, ReadFrameError};
use self::source::{ImageBuffer, LoadError, PAYLOAD_LEN};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115200;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on how long to wait for the full response.
    pub read_timeout: Duration,
    /// Pause after opening the port so the board can finish booting.
    pub settle_delay: Duration,
    pub output_dir: PathBuf,
    pub show: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            output_dir: PathBuf::from("."),
            show: false,
        }
    }
}

impl Config {
    /// Applies `INVERTER_*` environment overrides on top of the defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(port) = lookup("INVERTER_PORT") {
            config.port = port;
        }
        if let Some(baud) = lookup("INVERTER_BAUD") {
            config.baud_rate = parse_var("INVERTER_BAUD", &baud)?;
        }
        if let Some(ms) = lookup("INVERTER_TIMEOUT_MS") {
            config.read_timeout = Duration::from_millis(parse_var("INVERTER_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = lookup("INVERTER_SETTLE_MS") {
            config.settle_delay = Duration::from_millis(parse_var("INVERTER_SETTLE_MS", &ms)?);
        }
        if let Some(dir) = lookup("INVERTER_OUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(show) = lookup("INVERTER_SHOW") {
            config.show = matches!(show.trim(), "1" | "true" | "yes");
        }
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| Error::Config {
        var,
        value: value.to_owned(),
    })
}

/// A byte stream to the device that can drop whatever is already buffered.
pub trait Channel: Read + Write {
    fn discard_pending(&mut self) -> std::io::Result<()>;
}

impl Channel for Box<dyn SerialPort> {
    fn discard_pending(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::All)?;
        Ok(())
    }
}

/// One exchange with the device. The channel is closed when the session is
/// dropped, which [`Session::exchange`] always does.
pub struct Session<C = Box<dyn SerialPort>> {
    codec: FrameCodec<C>,
    read_timeout: Duration,
}

impl Session {
    pub fn open(config: &Config) -> Result<Self, Error> {
        log::debug!("opening {} at {} baud", config.port, config.baud_rate);
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;
        Self::with_channel(port, config)
    }
}

impl<C: Channel> Session<C> {
    /// Waits for the device to settle, then clears stale input and output.
    pub fn with_channel(channel: C, config: &Config) -> Result<Self, Error> {
        let mut session = Self {
            codec: FrameCodec::new(channel),
            read_timeout: config.read_timeout,
        };
        if !config.settle_delay.is_zero() {
            log::debug!("waiting {:?} for device to settle", config.settle_delay);
            thread::sleep(config.settle_delay);
        }
        session.codec.get_mut().discard_pending()?;
        Ok(session)
    }

    /// Sends `image` and waits for exactly one image's worth of response.
    pub fn exchange(mut self, image: &ImageBuffer) -> Result<ImageBuffer, Error> {
        log::info!("sending {} bytes", PAYLOAD_LEN);
        self.codec.write_frame(image)?;
        self.codec.flush()?;

        log::info!("waiting for response");
        let response = self.codec.read_frame(self.read_timeout)?;
        log::trace!("received {:?}", response);
        Ok(response)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open channel: {0}")]
    ChannelOpen(#[from] serialport::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("expected {expected} bytes, got {received}")]
    ShortRead { received: usize, expected: usize },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid value for {var}: {value:?}")]
    Config { var: &'static str, value: String },
}

impl From<ReadFrameError> for Error {
    fn from(err: ReadFrameError) -> Self {
        match err {
            ReadFrameError::Io(err) => Self::Io(err),
            ReadFrameError::Short { received } => Self::ShortRead {
                received,
                expected: PAYLOAD_LEN,
            },
        }
    }
}
