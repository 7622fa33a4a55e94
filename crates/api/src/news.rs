//! Satirical news edition generator.

use quill_common::{ChatMessage, QuillError, Result};
use quill_llm::{LlmClient, LlmRequest};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const FALLBACK_ARTICLE: &str = "Error generating article.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub model: Option<String>,
    pub system_prompt: String,
    pub headlines: Vec<String>,
    pub article_prompts: Vec<String>,
    pub ads: Vec<String>,
    pub footer: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            model: Some("gpt-4o".into()),
            system_prompt:
                "You are a satirical news writer. Make it funny, but keep it in a real news format."
                    .into(),
            headlines: [
                "Fredrik Accidentally Invents Time Travel but Only Goes Back 7 Minutes",
                "Study Shows 98% of Fredriks Have No Idea What's Happening Right Now",
                "Fredrik Declares Himself 'Supreme Overlord' of His Apartment",
                "Local Authorities Confused After Every Street in Town Renamed to 'Fredrik Road'",
                "Breaking: Fredrik Discovers New Species of Fish Inside His Own Fridge",
            ]
            .map(String::from)
            .to_vec(),
            article_prompts: [
                "Write a funny fake news article about Fredrik discovering a secret government conspiracy in his sock drawer.",
                "Create a hilarious news report about Fredrik accidentally buying 10,000 rubber ducks online.",
                "Generate a satirical article about Fredrik being elected mayor due to a typo in the voting system.",
            ]
            .map(String::from)
            .to_vec(),
            ads: [
                "📢 **Try Fredrik's Masterclass on Procrastination!** - *Sign up later, or maybe never.*",
                "🍕 **Fredrik’s Pizza Delivery Service** - *We bring you pizza, eventually.*",
                "📺 **Fredrik TV: All Fredrik, All the Time** - *Now streaming 24/7!*",
            ]
            .map(String::from)
            .to_vec(),
            footer: "© 2025 Fredrik News Network. All Rights Absurd.".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsEdition {
    pub headline: String,
    pub article: String,
    pub ad: String,
    pub footer: String,
}

fn pick<R: Rng + ?Sized>(items: &[String], rng: &mut R) -> Option<String> {
    items.choose(rng).cloned()
}

/// Build one edition: random headline and ad, LLM-written article.
pub async fn generate_edition(config: &NewsConfig, llm: &dyn LlmClient) -> Result<NewsEdition> {
    // thread_rng is not Send, so every draw happens before the await
    let (headline, ad, prompt) = {
        let mut rng = rand::thread_rng();
        (
            pick(&config.headlines, &mut rng).unwrap_or_default(),
            pick(&config.ads, &mut rng).unwrap_or_default(),
            pick(&config.article_prompts, &mut rng),
        )
    };
    let prompt =
        prompt.ok_or_else(|| QuillError::Config("No news article prompts configured".into()))?;

    info!(headline = %headline, "Generating news edition");

    let request = LlmRequest::new(vec![
        ChatMessage::system(config.system_prompt.clone()),
        ChatMessage::user(prompt),
    ])
    .with_model(config.model.clone());

    let response = llm.complete(request).await?;
    let article = if response.content.trim().is_empty() {
        warn!("News completion returned no text");
        FALLBACK_ARTICLE.to_string()
    } else {
        response.content
    };

    Ok(NewsEdition {
        headline,
        article,
        ad,
        footer: config.footer.clone(),
    })
}
