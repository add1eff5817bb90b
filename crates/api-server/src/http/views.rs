use axum::http::StatusCode;
use minijinja::{Environment, context};
use shared::models::Turn;

const INDEX_TEMPLATE: &str = "index.html";
const ERROR_TEMPLATE: &str = "error.html";

/// HTML pages. Template names end in `.html`, so every value is auto-escaped.
pub(super) struct Views {
    env: Environment<'static>,
}

impl Views {
    pub(super) fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(INDEX_TEMPLATE, include_str!("../../templates/index.html"))?;
        env.add_template(ERROR_TEMPLATE, include_str!("../../templates/error.html"))?;
        Ok(Self { env })
    }

    pub(super) fn conversation(&self, turns: &[Turn]) -> Result<String, minijinja::Error> {
        self.env
            .get_template(INDEX_TEMPLATE)?
            .render(context! { turns => turns })
    }

    pub(super) fn error_page(
        &self,
        status: StatusCode,
        message: &str,
    ) -> Result<String, minijinja::Error> {
        self.env.get_template(ERROR_TEMPLATE)?.render(context! {
            status => status.to_string(),
            message => message,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use shared::models::{Conversation, Turn};

    use super::Views;

    #[test]
    fn renders_each_turn_in_order() {
        let views = Views::new().expect("templates should load");
        let mut conversation = Conversation::seeded();
        conversation.push(Turn::user("How many artists?"));
        conversation.push(Turn::assistant("There are 275 artists."));

        let html = views
            .conversation(conversation.turns())
            .expect("page should render");
        let greeting = html.find("Ask me anything").expect("greeting rendered");
        let question = html.find("How many artists?").expect("question rendered");
        let answer = html.find("There are 275 artists.").expect("answer rendered");
        assert!(greeting < question && question < answer);
        assert_eq!(html.matches("data-role=\"assistant\"").count(), 2);
        assert_eq!(html.matches("data-role=\"user\"").count(), 1);
    }

    #[test]
    fn escapes_turn_content() {
        let views = Views::new().expect("templates should load");
        let turns = vec![Turn::user("<script>alert(1)</script>")];
        let html = views.conversation(&turns).expect("page should render");
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn error_page_shows_status_and_message() {
        let views = Views::new().expect("templates should load");
        let html = views
            .error_page(StatusCode::INTERNAL_SERVER_ERROR, "Something failed")
            .expect("error page should render");
        assert!(html.contains("500 Internal Server Error"));
        assert!(html.contains("Something failed"));
    }
}
