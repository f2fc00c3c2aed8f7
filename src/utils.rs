use axum::http::HeaderMap;
use std::net::SocketAddr;

/// longest file name we keep (extension included)
pub const MAX_FILENAME_LEN: usize = 200;

/// reduce a client supplied file name to something safe to store on disk
///
/// path components are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`,
/// long names are cut down keeping the extension, and names that would be
/// empty or a dot entry become `file`.
pub fn sanitize_filename(name: &str) -> String {
    // last path component, whichever separator the client used
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.len() > MAX_FILENAME_LEN {
        let ext = match cleaned.rfind('.') {
            Some(pos) if pos > 0 && cleaned.len() - pos < MAX_FILENAME_LEN => cleaned[pos..].to_string(),
            _ => String::new(),
        };
        cleaned.truncate(MAX_FILENAME_LEN - ext.len());
        cleaned.push_str(&ext);
    }

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return "file".to_string();
    }
    cleaned
}

/// best guess at the uploader's address: proxy headers first, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// resolves on ctrl-c or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
