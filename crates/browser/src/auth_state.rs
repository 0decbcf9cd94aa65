//! Persisted authentication state: the cookie jar of a logged-in session.

use grocerbot_core::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::cdp::CdpClient;

/// Fields accepted by `Network.setCookies` (CookieParam).
const COOKIE_PARAM_KEYS: &[&str] = &[
    "name", "value", "domain", "path", "secure", "httpOnly", "sameSite",
    "expires", "priority", "sourceScheme", "sourcePort", "partitionKey",
];

/// Reduce a cookie as reported by `Network.getAllCookies` to a CookieParam.
fn to_cookie_param(cookie: &Value) -> Option<Value> {
    let obj = cookie.as_object()?;
    obj.get("name")?.as_str()?;
    let session = obj.get("session").and_then(|v| v.as_bool()).unwrap_or(false);
    let mut param = Map::new();
    for key in COOKIE_PARAM_KEYS {
        if *key == "expires" && session {
            continue;
        }
        if let Some(v) = obj.get(*key) {
            param.insert((*key).to_string(), v.clone());
        }
    }
    Some(Value::Object(param))
}

pub fn read_auth_state(path: &Path) -> Result<Option<Vec<Value>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let cookies: Vec<Value> = serde_json::from_str(&content)?;
    Ok(Some(cookies.iter().filter_map(to_cookie_param).collect()))
}

pub fn write_auth_state(path: &Path, cookies: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load the saved cookie jar into the page's browser, if one exists.
pub async fn restore(cdp: &CdpClient, path: &Path) -> Result<bool> {
    let cookies = match read_auth_state(path) {
        Ok(Some(cookies)) => cookies,
        Ok(None) => return Ok(false),
        Err(e) => {
            // A corrupt file must not block a fresh login.
            warn!(error = %e, path = %path.display(), "Ignoring unreadable auth state");
            return Ok(false);
        }
    };
    let count = cookies.len();
    cdp.set_cookies(cookies).await.map_err(Error::Browser)?;
    info!(path = %path.display(), cookies = count, "Authentication state restored");
    Ok(true)
}

pub async fn save(cdp: &CdpClient, path: &Path) -> Result<()> {
    let cookies = cdp.get_all_cookies().await.map_err(Error::Browser)?;
    write_auth_state(path, &cookies)?;
    info!(path = %path.display(), cookies = cookies.len(), "Authentication state saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_param_drops_read_only_fields() {
        let cookie = json!({
            "name": "sid", "value": "abc", "domain": ".5ka.ru", "path": "/",
            "expires": 1900000000.0, "size": 6, "httpOnly": true, "secure": true,
            "session": false, "sameSite": "Lax"
        });
        let param = to_cookie_param(&cookie).unwrap();
        assert!(param.get("size").is_none());
        assert!(param.get("session").is_none());
        assert_eq!(param["expires"], json!(1900000000.0));
    }

    #[test]
    fn test_session_cookie_has_no_expiry() {
        let cookie = json!({"name": "s", "value": "v", "expires": -1, "session": true});
        let param = to_cookie_param(&cookie).unwrap();
        assert!(param.get("expires").is_none());
        assert!(to_cookie_param(&json!({"value": "nameless"})).is_none());
    }

    #[test]
    fn test_write_then_read_auth_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth_state.json");
        assert!(read_auth_state(&path).unwrap().is_none());

        write_auth_state(&path, &[json!({"name": "sid", "value": "1", "size": 4})]).unwrap();
        let cookies = read_auth_state(&path).unwrap().unwrap();
        assert_eq!(cookies, vec![json!({"name": "sid", "value": "1"})]);
    }

    #[test]
    fn test_corrupt_auth_state_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth_state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(read_auth_state(&path), Err(Error::Json(_))));
    }
}
