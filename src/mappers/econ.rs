//! Economic cost transactions -> `econ.*`
//!
//! The widest fan-out of any source. Every transaction produces a count
//! and a per-category count mirror; amount, base-converted amount, and
//! quantity each add a pair (plain + per-category), and a price-per-unit
//! is derived when both amount and a non-zero quantity are present.

use super::{emit, require_non_empty, required_time, tag_opt, MapperError};
use crate::measurement::{sanitize_metric_part, Measurement};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct EconTxnPayload {
    tenant_id: String,
    farm_id: Option<String>,
    house_id: Option<String>,
    cost_center: Option<String>,
    device_id: Option<String>,
    category: String,
    subcategory: Option<String>,
    item_code: Option<String>,
    amount: Option<f64>,
    currency: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    base_currency: Option<String>,
    rate_to_base: Option<f64>,
    vendor_id: Option<String>,
    invoice_id: Option<String>,
}

/// Entity anchor priority: house > farm > cost_center > device.
pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: EconTxnPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.category, "category")?;
    let time = required_time(payload)?;

    let entity = d
        .house_id
        .as_deref()
        .or(d.farm_id.as_deref())
        .or(d.cost_center.as_deref())
        .or(d.device_id.as_deref());
    let Some(entity) = entity else {
        return Ok(Vec::new());
    };

    let cat = sanitize_metric_part(&d.category);

    let mut tags = BTreeMap::new();
    if let Some(sub) = &d.subcategory {
        tags.insert("subcat".to_string(), sanitize_metric_part(sub));
    }
    tag_opt(&mut tags, "currency", &d.currency);
    tag_opt(&mut tags, "unit", &d.unit);
    tag_opt(&mut tags, "vendor_id", &d.vendor_id);
    tag_opt(&mut tags, "invoice_id", &d.invoice_id);
    tag_opt(&mut tags, "farm_id", &d.farm_id);
    tag_opt(&mut tags, "house_id", &d.house_id);
    tag_opt(&mut tags, "cost_center", &d.cost_center);
    tag_opt(&mut tags, "item_code", &d.item_code);

    let mut out = vec![
        emit(&d.tenant_id, entity, "econ.txn.count".to_string(), 1.0, time, &tags),
        emit(
            &d.tenant_id,
            entity,
            format!("econ.category.{}.count", cat),
            1.0,
            time,
            &tags,
        ),
    ];

    if let Some(amount) = d.amount {
        out.push(emit(&d.tenant_id, entity, "econ.txn.amount".to_string(), amount, time, &tags));
        out.push(emit(
            &d.tenant_id,
            entity,
            format!("econ.category.{}.amount", cat),
            amount,
            time,
            &tags,
        ));

        if let (Some(base), Some(rate)) = (&d.base_currency, d.rate_to_base) {
            let mut base_tags = tags.clone();
            base_tags.insert("currency".to_string(), base.clone());
            out.push(emit(
                &d.tenant_id,
                entity,
                "econ.txn.amount_base".to_string(),
                amount * rate,
                time,
                &base_tags,
            ));
            out.push(emit(
                &d.tenant_id,
                entity,
                format!("econ.category.{}.amount_base", cat),
                amount * rate,
                time,
                &base_tags,
            ));
        }
    }

    if let Some(qty) = d.quantity {
        out.push(emit(&d.tenant_id, entity, "econ.txn.qty".to_string(), qty, time, &tags));
        out.push(emit(
            &d.tenant_id,
            entity,
            format!("econ.category.{}.qty", cat),
            qty,
            time,
            &tags,
        ));

        if let Some(amount) = d.amount {
            if qty != 0.0 {
                out.push(emit(
                    &d.tenant_id,
                    entity,
                    "econ.txn.ppu".to_string(),
                    amount / qty,
                    time,
                    &tags,
                ));
            }
        }
    }

    Ok(out)
}
