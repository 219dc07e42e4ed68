//! MQTT topic path construction.
//!
//! Topics follow the pattern:
//! `root/<category>/<device>/<property>/<element>`, all lower-case.
//! Three well-known topics live directly under the root: `status`,
//! `poll` (inbound polling control) and `json` (aggregate document).

/// Default root topic.
pub const DEFAULT_ROOT: &str = "observatory";

/// Builder for the bridge's MQTT topics.
#[derive(Debug, Clone)]
pub struct TopicBuilder {
    root: String,
}

impl TopicBuilder {
    /// Create a builder with the given root topic. The root is
    /// lower-cased once here; all other segments are sanitized per
    /// call.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: sanitize(&root.into()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Leaf topic for one element value.
    pub fn leaf(&self, category: &str, device: &str, property: &str, element: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.root,
            sanitize(category),
            sanitize(device),
            sanitize(property),
            sanitize(element)
        )
    }

    /// Bridge status topic (payload "ON"/"OFF").
    pub fn status(&self) -> String {
        format!("{}/status", self.root)
    }

    /// Inbound polling-control topic.
    pub fn poll(&self) -> String {
        format!("{}/poll", self.root)
    }

    /// Aggregate JSON document topic.
    pub fn json(&self) -> String {
        format!("{}/json", self.root)
    }
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// Lower-case a topic segment and strip characters that would break
/// the topic hierarchy. No segment may contain `/`.
fn sanitize(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '#' | '+' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_topic() {
        let topics = TopicBuilder::new("observatory");
        assert_eq!(
            topics.leaf("TELESCOPE", "TELESCOPE_SIMULATOR", "CONNECTION", "CONNECT"),
            "observatory/telescope/telescope_simulator/connection/connect"
        );
    }

    #[test]
    fn test_well_known_topics() {
        let topics = TopicBuilder::new("Observatory");
        assert_eq!(topics.status(), "observatory/status");
        assert_eq!(topics.poll(), "observatory/poll");
        assert_eq!(topics.json(), "observatory/json");
    }

    #[test]
    fn test_segments_cannot_contain_separators() {
        let topics = TopicBuilder::new("obs");
        assert_eq!(
            topics.leaf("AUX", "A/B", "P+Q", "E#F"),
            "obs/aux/a_b/p_q/e_f"
        );
    }

    #[test]
    fn test_determinism() {
        let topics = TopicBuilder::new("obs");
        let a = topics.leaf("CCD", "CCD_SIMULATOR", "CCD_EXPOSURE", "CCD_EXPOSURE_VALUE");
        let b = topics.leaf("CCD", "CCD_SIMULATOR", "CCD_EXPOSURE", "CCD_EXPOSURE_VALUE");
        assert_eq!(a, b);
    }
}
