mod api_key;
mod service_account;

pub use api_key::ApiKey;
pub use service_account::{Bearer, SHEETS_SCOPE, ServiceAccount, TokenSource};
