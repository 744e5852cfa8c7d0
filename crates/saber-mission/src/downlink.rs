use saber_satcom::{Clock, LinkError, SatLink, Transport};

/// Outbound path for encoded telemetry frames.
pub trait TelemetryDownlink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError>;
    /// Short state text for the status display.
    fn state_text(&self) -> &'static str;
}

impl<T: Transport, C: Clock> TelemetryDownlink for SatLink<T, C> {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.send_raw(frame)
    }

    fn state_text(&self) -> &'static str {
        self.state().as_str()
    }
}
