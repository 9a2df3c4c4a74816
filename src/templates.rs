use std::sync::OnceLock;
use tera::Tera;

static TERA: OnceLock<Tera> = OnceLock::new();

const VERIFY_PAGE: &str = "verify.html";

pub fn get_tera() -> &'static Tera {
    TERA.get_or_init(|| {
        let mut tera = match Tera::new("templates/**/*.html") {
            Ok(tera) => tera,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load templates from disk");
                Tera::default()
            }
        };
        // Fall back to the copy compiled into the binary.
        if !tera.get_template_names().any(|name| name == VERIFY_PAGE) {
            if let Err(e) =
                tera.add_raw_template(VERIFY_PAGE, include_str!("../templates/verify.html"))
            {
                tracing::error!(error = %e, "Bundled verification page does not parse");
            }
        }
        tera
    })
}
