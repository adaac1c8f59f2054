use std::sync::Arc;
use std::time::Instant;

use tonic::{Request, Response, Status};
use tracing::Span;
use uuid::Uuid;

use super::convert::{address_from_wire, item_from_wire, order_to_wire};
use crate::db::Repository;
use crate::metrics::Metrics;
use crate::models::{Order, OrderStatus};
use crate::proto::order_service_server::{OrderService as OrderRpc, OrderServiceServer};
use crate::proto::{
    CreateOrderRequest, CreateOrderResponse, GetOrderRequest, GetOrderResponse, GetOrdersRequest,
    GetOrdersResponse, UpdateOrderStatusRequest, UpdateOrderStatusResponse,
};
use crate::service::{OrderService, ServiceError};

// ============================================================================
// gRPC Handler - boundary translation
// ============================================================================
//
// Parses identifiers, maps wire messages to domain records, calls the
// service and maps results back. Every failure becomes a Status whose
// message is the human-readable response message.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed client input; the store was not touched
    InvalidArgument,
    NotFound,
    /// Store or transaction failure, surfaced verbatim
    Store,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HandlerError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn outcome(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Store => "store_error",
        }
    }

    /// Map a service failure, prefixing store errors with `context`
    fn from_service(err: ServiceError, context: &str) -> Self {
        match err {
            ServiceError::NoOrdersFound => Self::new(ErrorKind::NotFound, "No orders found"),
            ServiceError::OrderNotFound => Self::new(ErrorKind::NotFound, "No order found"),
            ServiceError::Store(e) => Self::new(ErrorKind::Store, format!("{context}. error: {e}")),
        }
    }
}

impl From<HandlerError> for Status {
    fn from(err: HandlerError) -> Self {
        match err.kind {
            ErrorKind::InvalidArgument => Status::invalid_argument(err.message),
            ErrorKind::NotFound => Status::not_found(err.message),
            ErrorKind::Store => Status::internal(err.message),
        }
    }
}

fn parse_customer_id(raw: &str) -> Result<Uuid, HandlerError> {
    Uuid::parse_str(raw).map_err(|e| {
        HandlerError::new(
            ErrorKind::InvalidArgument,
            format!("Unable to parse customer id: {e}"),
        )
    })
}

pub struct OrderHandler<S> {
    service: OrderService<S>,
    metrics: Arc<Metrics>,
    span: Span,
}

impl<S: Repository<Order>> OrderHandler<S> {
    pub fn new(service: OrderService<S>, metrics: Arc<Metrics>, span: Span) -> Self {
        Self {
            service,
            metrics,
            span,
        }
    }

    pub fn into_server(self) -> OrderServiceServer<Self> {
        OrderServiceServer::new(self)
    }

    async fn handle_create_order(&self, req: CreateOrderRequest) -> Result<CreateOrderResponse, HandlerError> {
        let customer_id = parse_customer_id(&req.customer_id)?;
        let address = req
            .address
            .map(address_from_wire)
            .ok_or_else(|| HandlerError::new(ErrorKind::InvalidArgument, "Address is required"))?;
        let items = req.items.into_iter().map(item_from_wire).collect();

        let order = Order::new(customer_id, items, address, req.phone);

        tracing::info!(
            parent: &self.span,
            order_id = %order.order_id,
            customer_id = %customer_id,
            item_count = order.items.len(),
            "Creating new order"
        );

        if let Err(e) = self.service.create_order(&order).await {
            self.metrics.record_order_transaction(false);
            tracing::error!(parent: &self.span, order_id = %order.order_id, error = %e, "Order transaction aborted");
            return Err(HandlerError::from_service(e, "Failed to create the order"));
        }

        self.metrics.record_order_transaction(true);
        self.metrics.record_line_items(order.items.len());

        Ok(CreateOrderResponse {
            message: "Successfully created the order".to_string(),
            order_id: order.order_id,
        })
    }

    async fn handle_get_orders(&self, req: GetOrdersRequest) -> Result<GetOrdersResponse, HandlerError> {
        let customer_id = parse_customer_id(&req.customer_id)?;

        let orders = self
            .service
            .get_orders(customer_id)
            .await
            .map_err(|e| HandlerError::from_service(e, "Failed to retrieve the orders"))?;

        Ok(GetOrdersResponse {
            orders: orders.into_iter().map(order_to_wire).collect(),
            message: "Successfully retrieved the orders".to_string(),
        })
    }

    async fn handle_get_order(&self, req: GetOrderRequest) -> Result<GetOrderResponse, HandlerError> {
        let customer_id = parse_customer_id(&req.customer_id)?;

        let order = self
            .service
            .get_order(customer_id, &req.order_id)
            .await
            .map_err(|e| HandlerError::from_service(e, "Failed to retrieve the order"))?;

        Ok(GetOrderResponse {
            order: Some(order_to_wire(order)),
            message: "Successfully retrieved the order".to_string(),
        })
    }

    /// Any status string is accepted. The whole order is re-persisted even
    /// when the status is unchanged.
    async fn handle_update_order_status(
        &self,
        req: UpdateOrderStatusRequest,
    ) -> Result<UpdateOrderStatusResponse, HandlerError> {
        let customer_id = parse_customer_id(&req.customer_id)?;

        let mut order = self
            .service
            .get_order(customer_id, &req.order_id)
            .await
            .map_err(|e| HandlerError::from_service(e, "Failed to retrieve the order"))?;

        let status = OrderStatus::from(req.status);
        if order.status != status {
            tracing::debug!(
                parent: &self.span,
                order_id = %order.order_id,
                from = %order.status,
                to = %status,
                "Changing order status"
            );
            order.status = status;
        }

        self.service
            .update_order(&order)
            .await
            .map_err(|e| HandlerError::from_service(e, "Failed to update the order status"))?;

        Ok(UpdateOrderStatusResponse {
            message: "Successfully updated the order status".to_string(),
        })
    }

    fn finish<T>(&self, method: &str, started: Instant, result: Result<T, HandlerError>) -> Result<Response<T>, Status> {
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(response) => {
                self.metrics.record_rpc(method, "ok", elapsed);
                Ok(Response::new(response))
            }
            Err(err) => {
                self.metrics.record_rpc(method, err.outcome(), elapsed);
                tracing::warn!(parent: &self.span, method, kind = ?err.kind, "{}", err.message);
                Err(err.into())
            }
        }
    }
}

#[tonic::async_trait]
impl<S: Repository<Order>> OrderRpc for OrderHandler<S> {
    async fn create_order(
        &self,
        request: Request<CreateOrderRequest>,
    ) -> Result<Response<CreateOrderResponse>, Status> {
        let started = Instant::now();
        let result = self.handle_create_order(request.into_inner()).await;
        self.finish("create_order", started, result)
    }

    async fn get_orders(
        &self,
        request: Request<GetOrdersRequest>,
    ) -> Result<Response<GetOrdersResponse>, Status> {
        let started = Instant::now();
        let result = self.handle_get_orders(request.into_inner()).await;
        self.finish("get_orders", started, result)
    }

    async fn get_order(
        &self,
        request: Request<GetOrderRequest>,
    ) -> Result<Response<GetOrderResponse>, Status> {
        let started = Instant::now();
        let result = self.handle_get_order(request.into_inner()).await;
        self.finish("get_order", started, result)
    }

    async fn update_order_status(
        &self,
        request: Request<UpdateOrderStatusRequest>,
    ) -> Result<Response<UpdateOrderStatusResponse>, Status> {
        let started = Instant::now();
        let result = self.handle_update_order_status(request.into_inner()).await;
        self.finish("update_order_status", started, result)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
