// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Ready-made schemas for tests, demos, and examples.

use prost_reflect::DescriptorPool;

use super::{DescriptorBlob, FieldSchema, FileSchema, MethodSchema};

/// `echo.Echo/Echo`, annotated `GET /api/echo`.
pub fn echo_schema() -> FileSchema {
    FileSchema::new("echo.proto", "echo")
        .message("EchoRequest", vec![FieldSchema::string("say", 1)])
        .message("EchoResponse", vec![FieldSchema::string("message", 1)])
        .service(
            "Echo",
            vec![MethodSchema::new("Echo", ".echo.EchoRequest", ".echo.EchoResponse")
                .http_get("/api/echo")
                .summary("Echo a message back", &["echo"])],
        )
}

pub fn echo_blob() -> DescriptorBlob {
    DescriptorBlob::from_schema(echo_schema()).expect("echo schema is valid")
}

pub fn echo_pool() -> DescriptorPool {
    echo_blob().pool().clone()
}

/// `users.Users/GetUser`, annotated `GET /api/users/{id}` with `id: int32`.
pub fn users_blob() -> DescriptorBlob {
    let schema = FileSchema::new("users.proto", "users")
        .message("GetUserRequest", vec![FieldSchema::int32("id", 1)])
        .message(
            "User",
            vec![
                FieldSchema::int32("id", 1),
                FieldSchema::string("name", 2),
            ],
        )
        .service(
            "Users",
            vec![MethodSchema::new("GetUser", ".users.GetUserRequest", ".users.User")
                .http_get("/api/users/{id}")],
        );
    DescriptorBlob::from_schema(schema).expect("users schema is valid")
}

/// A scan service whose request touches every common scalar kind plus a
/// repeated field, for binding tests.
pub fn scan_blob() -> DescriptorBlob {
    let schema = FileSchema::new("scan.proto", "scan")
        .message(
            "ScanRequest",
            vec![
                FieldSchema::int64("offset", 1),
                FieldSchema::uint32("limit", 2),
                FieldSchema::bool("verbose", 3),
                FieldSchema::double("ratio", 4),
                FieldSchema::string("tags", 5).repeated(),
            ],
        )
        .message("ScanResponse", vec![FieldSchema::string("status", 1)])
        .service(
            "Scan",
            vec![MethodSchema::new("Scan", ".scan.ScanRequest", ".scan.ScanResponse")
                .http_get("/api/scan")],
        );
    DescriptorBlob::from_schema(schema).expect("scan schema is valid")
}

/// An order service exercising body rules: `POST` with `body: "*"` and
/// `PUT` with a field selector.
pub fn orders_blob() -> DescriptorBlob {
    let schema = FileSchema::new("orders.proto", "orders")
        .message(
            "Order",
            vec![
                FieldSchema::string("id", 1),
                FieldSchema::string("item", 2),
                FieldSchema::uint32("quantity", 3),
            ],
        )
        .message(
            "CreateOrderRequest",
            vec![
                FieldSchema::string("id", 1),
                FieldSchema::string("item", 2),
                FieldSchema::uint32("quantity", 3),
            ],
        )
        .message(
            "UpdateOrderRequest",
            vec![
                FieldSchema::string("id", 1),
                FieldSchema::message("order", 2, ".orders.Order"),
            ],
        )
        .service(
            "Orders",
            vec![
                MethodSchema::new("CreateOrder", ".orders.CreateOrderRequest", ".orders.Order")
                    .http_post("/api/orders", "*"),
                MethodSchema::new("UpdateOrder", ".orders.UpdateOrderRequest", ".orders.Order")
                    .http_put("/api/orders/{id}", "order"),
            ],
        );
    DescriptorBlob::from_schema(schema).expect("orders schema is valid")
}
