use actix_web::{web, HttpResponse};
use order_domain::models::{NewOrder, NewOrderItem};
use order_domain::DomainError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub total_amount: f64,
    #[serde(default = "default_status")]
    pub status: String,
    pub items: Vec<CreateOrderItemRequest>,
}

fn default_status() -> String {
    "pending".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub status: String,
}

pub async fn create_order(
    state: web::Data<Arc<AppState>>,
    body: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    let cmd = NewOrder {
        id: None,
        customer_id: body.customer_id,
        total_amount: body.total_amount,
        status: body.status,
        items: body
            .items
            .into_iter()
            .map(|i| NewOrderItem {
                product_id: i.product_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect(),
    };

    match state.orders.create_order(cmd).await {
        Ok(summary) => HttpResponse::Created().json(CreateOrderResponse {
            order_id: summary.order_id,
            customer_id: summary.customer_id,
            total_amount: summary.total_amount,
            status: summary.status,
        }),
        Err(DomainError::Validation(msg)) => HttpResponse::BadRequest().json(ErrorBody { error: msg }),
        Err(DomainError::DuplicateOrder(id)) => {
            HttpResponse::Conflict().json(ErrorBody {
                error: format!("order {id} already exists"),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "create_order failed");
            HttpResponse::InternalServerError().json(ErrorBody {
                error: "internal error".to_string(),
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(create_order));
}
