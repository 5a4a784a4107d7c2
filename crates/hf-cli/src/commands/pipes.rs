use hf_api_types::{CreatePipeRequest, Pipe};
use hf_client::pipes::PipePage;
use hf_client::ClientContext;

use super::friendly_error;

pub async fn list(ctx: &ClientContext, page: u32, limit: u32, json: bool) -> anyhow::Result<()> {
    let result = ctx
        .pipes()
        .list(page, limit)
        .await
        .map_err(|e| friendly_error(ctx, e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.items)?);
    } else {
        print!("{}", render_page(&result));
    }
    Ok(())
}

pub async fn create(ctx: &ClientContext, request: CreatePipeRequest) -> anyhow::Result<()> {
    let pipe = ctx
        .pipes()
        .create(&request)
        .await
        .map_err(|e| friendly_error(ctx, e))?;
    println!("created pipe {} ({})", pipe.slug, pipe.id);
    Ok(())
}

pub async fn delete(ctx: &ClientContext, id: &str) -> anyhow::Result<()> {
    ctx.pipes()
        .delete(id)
        .await
        .map_err(|e| friendly_error(ctx, e))?;
    println!("deleted pipe {id}");
    Ok(())
}

fn render_page(page: &PipePage) -> String {
    if page.items.is_empty() {
        return "no pipes\n".to_string();
    }
    let mut out = format!("{:<24} {:<20} {}\n", "ID", "SLUG", "TARGET");
    out.push_str(&"-".repeat(72));
    out.push('\n');
    for pipe in &page.items {
        out.push_str(&render_row(pipe));
    }
    if let Some(p) = page.pagination {
        out.push_str(&format!(
            "page {}/{} ({} pipes)\n",
            p.page, p.total_page, p.total_data
        ));
    }
    out
}

fn render_row(pipe: &Pipe) -> String {
    let filter = pipe
        .jq_filter
        .as_deref()
        .map(|f| format!("  [jq: {f}]"))
        .unwrap_or_default();
    format!("{:<24} {:<20} {}{filter}\n", pipe.id, pipe.slug, pipe.target_url)
}
