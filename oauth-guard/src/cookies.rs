//! Cookie header lookup.

/// Find a cookie by exact name in a `Cookie` request header value.
///
/// The value is percent-decoded; a value that does not decode is returned raw.
pub fn get_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| match urlencoding::decode(value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cookie() {
        let header = "theme=dark; csrf-token=abc123;oauth_pkce_0a=v%3Dx=y";
        assert_eq!(get_cookie(header, "theme"), Some("dark".to_string()));
        assert_eq!(get_cookie(header, "csrf-token"), Some("abc123".to_string()));
        assert_eq!(get_cookie(header, "oauth_pkce_0a"), Some("v=x=y".to_string()));
    }

    #[test]
    fn test_get_cookie_requires_exact_name() {
        let header = "xcsrf-token=nope; csrf-token-old=nope";
        assert_eq!(get_cookie(header, "csrf-token"), None);
        assert_eq!(get_cookie("", "csrf-token"), None);
        assert_eq!(get_cookie("csrf-token", "csrf-token"), None);
    }

    #[test]
    fn test_get_cookie_keeps_undecodable_value() {
        assert_eq!(get_cookie("a=%FF%FE", "a"), Some("%FF%FE".to_string()));
    }
}
