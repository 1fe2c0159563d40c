use serde::Serialize;

use crate::catalog::Product;

const ADVISOR_PROMPT: &str = "You are a helpful skincare expert and beauty advisor.\n\n\
You help users build personalized skincare routines, answer questions about products, and provide expert advice.";

const ADVISOR_CLOSING: &str = "Keep responses friendly, informative, and helpful. \
If users ask about specific products, refer to their selected products when relevant.";

const ROUTINE_PROMPT: &str = "You are a professional skincare expert and beauty advisor.\n\n\
Create detailed, personalized skincare routines based on the specific products provided. \
Always consider product compatibility, proper usage order, and skin safety.\n\n\
For routine generation, provide:\n\
1. Morning and evening routine order\n\
2. How to use each product properly\n\
3. Tips for combining products safely\n\
4. Expected benefits from this routine\n\
5. Any warnings or precautions\n\n\
Keep responses friendly, detailed, and easy to follow.";

/// The product fields the assistant sees. Ids and image links stay local.
#[derive(Debug, Serialize)]
struct ProductContext<'a> {
    name: &'a str,
    brand: &'a str,
    category: &'a str,
    description: &'a str,
}

fn product_context(selected: &[Product]) -> String {
    if selected.is_empty() {
        return "No products currently selected.".to_string();
    }
    let ctx: Vec<ProductContext<'_>> = selected
        .iter()
        .map(|p| ProductContext {
            name: &p.name,
            brand: &p.brand,
            category: &p.category,
            description: &p.description,
        })
        .collect();
    match serde_json::to_string_pretty(&ctx) {
        Ok(json) => format!("Currently selected products:\n{}", json),
        Err(_) => format!("Currently selected products: {}", product_list(selected)),
    }
}

pub fn chat_system_prompt(selected: &[Product]) -> String {
    format!(
        "{}\n\nCurrent context:\n{}\n\n{}",
        ADVISOR_PROMPT,
        product_context(selected),
        ADVISOR_CLOSING
    )
}

pub fn routine_system_prompt(selected: &[Product]) -> String {
    format!("{}\n\n{}", ROUTINE_PROMPT, product_context(selected))
}

/// `"<name> by <brand>, ..."`
pub fn product_list(selected: &[Product]) -> String {
    selected
        .iter()
        .map(|p| format!("{} by {}", p.name, p.brand))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn routine_request(selected: &[Product]) -> String {
    format!("Create a skincare routine using these products: {}", product_list(selected))
}
