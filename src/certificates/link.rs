/// Public verification URL for a certificate code.
pub fn verification_url(base_url: &str, code: &str) -> String {
    format!("{}/verify/{}", base_url.trim_end_matches('/'), code)
}
