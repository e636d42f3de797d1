// zen-tpi: Async client for the Zencontrol TPI Advanced protocol (framing + session).

pub mod decode;
pub mod error;
pub mod frame;
pub mod session;

pub use decode::{DeviceReportParser, FrameDecoder, FrameParser, InboundFrame, Parsed, ReportValue};
pub use error::{ConnectError, DecodeError, EncodingError, SendError};
pub use frame::{Frame, FrameLimits, Handshake, command};
pub use session::{
    Connector, Endpoint, Session, SessionOptions, SessionState, TcpConnector, Transport,
};
