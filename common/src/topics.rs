pub const FEED_CONCENTRATION: &str = "concentration";
pub const FEED_AIR_QUALITY: &str = "airQuality";

/// Adafruit IO style feed topic: `<username>/feeds/<feed>`.
pub fn feed_topic(username: &str, feed: &str) -> String {
    format!("{username}/feeds/{feed}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTopics {
    pub concentration: String,
    pub air_quality: String,
}

impl FeedTopics {
    pub fn for_user(username: &str) -> Self {
        Self {
            concentration: feed_topic(username, FEED_CONCENTRATION),
            air_quality: feed_topic(username, FEED_AIR_QUALITY),
        }
    }
}
