//! Provider redirect URL construction and token extraction.

use url::Url;
use zklogin_types::{AuthError, OidcProvider};

/// Authorization URL requesting an id token bound to `nonce`.
pub fn authorization_url(
    provider: &OidcProvider,
    redirect_uri: &str,
    nonce: &str,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(provider.auth_endpoint()).map_err(|e| {
        AuthError::InvalidInput(format!("auth endpoint {}: {e}", provider.auth_endpoint()))
    })?;
    url.query_pairs_mut()
        .clear()
        .append_pair("client_id", provider.client_id())
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "id_token")
        .append_pair("scope", "openid email")
        .append_pair("nonce", nonce);
    Ok(url)
}

/// `id_token` from the callback URL fragment, falling back to the query string.
pub fn token_from_redirect(redirect: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect)
        .map_err(|e| AuthError::InvalidInput(format!("callback url: {e}")))?;

    let from_fragment = url.fragment().and_then(|fragment| {
        url::form_urlencoded::parse(fragment.as_bytes())
            .find(|(k, _)| k == "id_token")
            .map(|(_, v)| v.into_owned())
    });
    let token = from_fragment.or_else(|| {
        url.query_pairs()
            .find(|(k, _)| k == "id_token")
            .map(|(_, v)| v.into_owned())
    });

    match token {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(AuthError::MalformedToken(
            "callback carries no id_token".into(),
        )),
    }
}
