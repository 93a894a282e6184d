//! Test data builders for creating test objects

use canvis_rs::types::CanFrame;

/// Builder for creating test frames
pub struct FrameBuilder {
    id: u32,
    data: Vec<u8>,
    extended: Option<bool>,
    remote: bool,
    timestamp: f64,
    channel: String,
}

impl FrameBuilder {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            data: Vec::new(),
            extended: None,
            remote: false,
            timestamp: 0.0,
            channel: String::new(),
        }
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = Some(extended);
        self
    }

    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    pub fn timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn build(self) -> CanFrame {
        let frame = if self.remote {
            CanFrame::remote_frame(self.id, self.data.len() as u8)
        } else {
            CanFrame::data_frame(self.id, &self.data)
        }
        .expect("builder produced an invalid frame");
        let frame = match self.extended {
            Some(extended) => frame.with_extended_id(extended),
            None => frame,
        };
        frame
            .with_timestamp(self.timestamp)
            .with_channel(self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(0x123)
            .data(&[1, 2, 3])
            .timestamp(1.5)
            .channel("can0")
            .build();

        assert_eq!(frame.arbitration_id, 0x123);
        assert_eq!(frame.dlc, 3);
        assert!(!frame.is_extended_id);
        assert_eq!(frame.channel_label, "can0");
    }
}
