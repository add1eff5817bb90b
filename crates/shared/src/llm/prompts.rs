use minijinja::{Environment, context};

use crate::models::Turn;

const SQL_QUERY_TEMPLATE_NAME: &str = "sql_query";
const SQL_ANSWER_TEMPLATE_NAME: &str = "sql_answer";

const SQL_QUERY_TEMPLATE: &str = r#"You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's database.
Based on the table schema below, write a SQL query that would answer the user's question. Take the conversation history into account.

<SCHEMA>{{ schema }}</SCHEMA>

Conversation History: {{ chat_history }}

Write only the SQL query and nothing else. Do not wrap the SQL query in any other text, not even backticks.

For example:
Question: which 3 artists have the most tracks?
SQL Query: SELECT ArtistId, COUNT(*) as track_count FROM Track GROUP BY ArtistId ORDER BY track_count DESC LIMIT 3;
Question: Name 10 artists
SQL Query: SELECT Name FROM Artist LIMIT 10;

Your turn:

Question: {{ question }}
SQL Query:"#;

const SQL_ANSWER_TEMPLATE: &str = r#"You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's database.
Based on the table schema below, question, sql query, and sql response, write a natural language response.
<SCHEMA>{{ schema }}</SCHEMA>

Conversation History: {{ chat_history }}
SQL Query: <SQL>{{ query }}</SQL>
User question: {{ question }}
SQL Response: {{ response }}"#;

/// The two fixed prompts of the chain, compiled once.
pub struct PromptTemplates {
    env: Environment<'static>,
}

impl PromptTemplates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template(SQL_QUERY_TEMPLATE_NAME, SQL_QUERY_TEMPLATE)?;
        env.add_template(SQL_ANSWER_TEMPLATE_NAME, SQL_ANSWER_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render_sql_query(
        &self,
        schema: &str,
        chat_history: &str,
        question: &str,
    ) -> Result<String, minijinja::Error> {
        self.env
            .get_template(SQL_QUERY_TEMPLATE_NAME)?
            .render(context! { schema, chat_history, question })
    }

    pub fn render_sql_answer(
        &self,
        schema: &str,
        chat_history: &str,
        question: &str,
        query: &str,
        response: &str,
    ) -> Result<String, minijinja::Error> {
        self.env
            .get_template(SQL_ANSWER_TEMPLATE_NAME)?
            .render(context! { schema, chat_history, question, query, response })
    }
}

/// One line per turn, oldest first: `AI: ...` or `Human: ...`.
pub fn format_chat_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.prompt_label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}
