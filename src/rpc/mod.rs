pub mod resolver;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use resolver::PortResolver;
pub use transport::{HttpTransport, RpcTransport};
