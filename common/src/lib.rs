pub mod air_quality;
pub mod clock;
pub mod config;
pub mod monitor;
pub mod publisher;
pub mod sensors;
pub mod session;
pub mod status;
pub mod topics;
pub mod types;
pub mod window;

pub use air_quality::{AirQualityClassifier, SlopeClassifier};
pub use clock::{elapsed_ms, Clock, Delay, Interval, Millis};
pub use config::{LedConfig, MonitorConfig, NetworkConfig, RuntimeConfig};
pub use monitor::{Monitor, TickReport};
pub use publisher::{FeedValue, PublishOutcome, Publisher};
pub use sensors::{AirQualitySensor, Board, DustSensor, EnvironmentSensor, FailureLatch};
pub use session::{BrokerSession, ConnectError, ConnectionManager, Heartbeat};
pub use status::{LedPainter, PixelStrip, Rgb, StatusReport, StatusSink};
pub use topics::*;
pub use types::{AirQuality, ConnectionState, EnvironmentReading};
pub use window::{DustReading, SamplingWindow};
