mod device;
mod manager;
mod mock;
#[cfg(test)]
mod tests;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod gst;

pub use device::{CaptureMode, DeviceInfo, DeviceStream, MediaDevice, StreamRequest};
pub use manager::{CaptureSessionManager, SessionState};
pub use mock::{MockDeviceStream, MockFailure, MockMediaDevice};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gst::{GstDeviceStream, GstMediaDevice};
