
pub use rpc::*;
pub use wallet::*;
