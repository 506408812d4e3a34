//! Browser layer: Chrome lifecycle, a DevTools-protocol client, and the
//! concrete page/tab capabilities the agent and orchestrator run over.

pub mod cdp;
pub mod chrome;
pub mod host;
pub mod page;

pub use cdp::CdpClient;
pub use chrome::{find_browser_binary, Chrome, Tab};
pub use host::BrowserHost;
pub use page::CdpPage;
