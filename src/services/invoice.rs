use crate::{
    models::OrderModel,
    services::{
        email::{escape, Delivery, EmailService},
        order::{OrderDetails, ResolvedLine},
    },
};

pub const INVOICE_SUBJECT: &str = "Order Invoice";
pub const CONFIRMATION_SUBJECT: &str = "Order Confirmation";

/// `<title> (Category: <category>) x <qty> @ <currency><price>`, or
/// `Item x <qty>` for a reference that matched nothing in the catalog.
fn line_text(line: &ResolvedLine, currency: &str) -> String {
    match &line.resolved {
        Some(item) => format!(
            "{} (Category: {}) x {} @ {}{}",
            escape(item.title()),
            item.category().map(escape).unwrap_or_else(|| "N/A".to_string()),
            line.item.quantity,
            escape(currency),
            item.price()
        ),
        None => format!("Item x {}", line.item.quantity),
    }
}

/// Distinct categories of the resolved items, in order of first appearance.
fn box_names(lines: &[ResolvedLine]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for category in lines
        .iter()
        .filter_map(|l| l.resolved.as_ref())
        .filter_map(|item| item.category())
    {
        if !names.contains(&category) {
            names.push(category);
        }
    }
    names
}

pub fn render_invoice(order: &OrderModel, lines: &[ResolvedLine], currency: &str) -> String {
    let boxes = box_names(lines);
    let boxes = if boxes.is_empty() {
        "N/A".to_string()
    } else {
        boxes.iter().map(|b| escape(b)).collect::<Vec<_>>().join(", ")
    };
    let items = lines
        .iter()
        .map(|l| line_text(l, currency))
        .collect::<Vec<_>>()
        .join("<br/>");

    format!(
        "<h3>Order {}</h3><p>Total: {}{}</p><p>Address: {}</p><p>Boxes: {}</p><p>Items:<br/>{}</p>",
        order.id,
        escape(currency),
        order.total,
        escape(order.shipping_address.as_deref().unwrap_or("")),
        boxes,
        items
    )
}

pub fn render_confirmation(order: &OrderModel, lines: &[ResolvedLine], currency: &str) -> String {
    let items = lines
        .iter()
        .map(|l| format!("<li>{}</li>", line_text(l, currency)))
        .collect::<String>();

    format!(
        "<h3>Thank you for your order</h3><p>Order {} is paid.</p><p>Total: {}{}</p><p>Address: {}</p><ul>{}</ul>",
        order.id,
        escape(currency),
        order.total,
        escape(order.shipping_address.as_deref().unwrap_or("")),
        items
    )
}

/// Email the buyer a summary of the order. Orders whose buyer cannot be
/// loaded are skipped.
pub async fn send_order_email(
    email_service: &EmailService,
    details: &OrderDetails,
    subject: &str,
) -> Delivery {
    let Some(buyer) = details.buyer.as_ref().filter(|b| !b.email.is_empty()) else {
        tracing::debug!("Order {} has no reachable buyer, skipping email", details.order.id);
        return Delivery::Skipped;
    };

    let currency = email_service.currency_symbol();
    let html = if subject == CONFIRMATION_SUBJECT {
        render_confirmation(&details.order, &details.lines, currency)
    } else {
        render_invoice(&details.order, &details.lines, currency)
    };

    email_service
        .send_html(&buyer.email, &buyer.username, subject, html)
        .await
}
