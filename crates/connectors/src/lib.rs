//! Protocol connectors — session-oriented SOAP banking cores and
//! stateless REST endpoints behind one uniform contract.

pub mod connector;
pub mod flexcube;
pub mod mapping;
pub mod rest;
pub mod soap;
pub mod transport;

pub use connector::{
    ConnectionSession, ConnectorRequest, ConnectorResponse, ProtocolConnector, RequestOptions,
    ResponseStatus,
};
pub use flexcube::FlexcubeConnector;
pub use rest::RestEndpointClient;
pub use transport::{HttpSoapTransport, SoapTransport};
