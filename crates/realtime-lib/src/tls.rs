//! rustls crypto provider setup for `wss` connections.

use std::sync::Once;
use tracing::debug;

static INSTALL: Once = Once::new();

/// Install ring as the process-wide rustls provider, once.
///
/// Another component may already have installed a provider; that one wins.
pub fn install_default_provider() {
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}
