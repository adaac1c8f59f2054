use chrono::{DateTime, Utc};

use crate::models::{Address, Item, Order};
use crate::proto;

// ============================================================================
// Wire <-> Domain mapping (1:1, no validation beyond shape)
// ============================================================================

pub fn item_from_wire(item: proto::OrderItem) -> Item {
    Item {
        product_id: item.product_id,
        quantity: item.quantity,
        price: item.price,
    }
}

pub fn address_from_wire(address: proto::Address) -> Address {
    Address {
        address_line1: address.address_line1,
        address_line2: address.address_line2,
        city: address.city,
        state: address.state,
        zip: address.zip,
        country: address.country,
    }
}

pub fn item_to_wire(item: Item) -> proto::OrderItem {
    proto::OrderItem {
        product_id: item.product_id,
        quantity: item.quantity,
        price: item.price,
    }
}

pub fn address_to_wire(address: Address) -> proto::Address {
    proto::Address {
        address_line1: address.address_line1,
        address_line2: address.address_line2,
        city: address.city,
        state: address.state,
        zip: address.zip,
        country: address.country,
    }
}

pub fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

pub fn order_to_wire(order: Order) -> proto::Order {
    proto::Order {
        order_id: order.order_id,
        status: order.status.to_string(),
        items: order.items.into_iter().map(item_to_wire).collect(),
        address: Some(address_to_wire(order.address)),
        phone: order.phone,
        total_price: order.total_price,
        customer_id: order.customer_id.to_string(),
        created_at: Some(timestamp(order.created_at)),
        updated_at: Some(timestamp(order.updated_at)),
    }
}
