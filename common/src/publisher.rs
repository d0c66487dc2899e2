use log::{info, warn};

use crate::{
    clock::Delay,
    session::{BrokerSession, ConnectionManager},
    topics::FeedTopics,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedValue {
    Concentration(f32),
    AirQuality(i32),
}

impl FeedValue {
    pub fn payload(&self) -> String {
        match self {
            Self::Concentration(value) => format!("{value:.2}"),
            Self::AirQuality(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Disconnected,
    Rejected,
}

/// Sends one value per closed window. Nothing is queued: a value that
/// cannot be sent now is dropped.
#[derive(Debug, Clone)]
pub struct Publisher {
    topics: FeedTopics,
}

impl Publisher {
    pub fn new(topics: FeedTopics) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &FeedTopics {
        &self.topics
    }

    fn topic_for(&self, value: &FeedValue) -> &str {
        match value {
            FeedValue::Concentration(_) => &self.topics.concentration,
            FeedValue::AirQuality(_) => &self.topics.air_quality,
        }
    }

    pub fn publish_if_ready<S: BrokerSession, D: Delay>(
        &self,
        connection: &mut ConnectionManager<S, D>,
        value: FeedValue,
    ) -> PublishOutcome {
        if !connection.is_healthy() {
            warn!("broker disconnected; dropping {value:?}");
            return PublishOutcome::Disconnected;
        }

        let topic = self.topic_for(&value);
        let payload = value.payload();
        if connection.session_mut().publish(topic, payload.as_bytes()) {
            info!("published {payload} to {topic}");
            PublishOutcome::Sent
        } else {
            warn!("broker refused publish to {topic}");
            PublishOutcome::Rejected
        }
    }
}
