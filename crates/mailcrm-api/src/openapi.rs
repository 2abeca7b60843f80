//! OpenAPI documentation
//!
//! Serves a hand-maintained OpenAPI 3.0 document for the MailCRM dispatch API.

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::{json, Value};

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

fn owner_param() -> Value {
    json!({"name": "owner_id", "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}})
}

fn id_param(name: &str) -> Value {
    json!({"name": name, "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}})
}

fn error_ref(description: &str) -> Value {
    json!({
        "description": description,
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Error"}}}
    })
}

fn get_openapi_spec() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "MailCRM Dispatch API",
            "description": "Email dispatch for a multi-tenant CRM.\n\n## Authentication\n\nEndpoints under `/api/v1` require an API key.\n\n- **Header**: `X-API-Key: <your-api-key>`\n- **Bearer**: `Authorization: Bearer <your-api-key>`\n\nProvider webhooks are authenticated by HMAC signature instead.",
            "version": "1.0.0"
        },
        "servers": [{"url": "/", "description": "Current server"}],
        "tags": [
            {"name": "Send", "description": "Single and bulk dispatch"},
            {"name": "Campaigns", "description": "Campaign fan-out and stats"},
            {"name": "Drafts", "description": "Staged bulk sends"},
            {"name": "Templates", "description": "Personalization preview"},
            {"name": "Analytics", "description": "Engagement summary and export"},
            {"name": "Webhooks", "description": "Provider event callbacks"},
            {"name": "Health", "description": "Health checks and metrics"}
        ],
        "paths": {
            "/health": {
                "get": {"tags": ["Health"], "summary": "Basic health check", "responses": {"200": {"description": "Healthy"}}}
            },
            "/health/live": {
                "get": {"tags": ["Health"], "summary": "Liveness probe", "responses": {"200": {"description": "Process is running"}}}
            },
            "/health/ready": {
                "get": {"tags": ["Health"], "summary": "Readiness probe", "responses": {"200": {"description": "Storage reachable"}, "503": {"description": "Storage unavailable"}}}
            },
            "/metrics": {
                "get": {"tags": ["Health"], "summary": "Prometheus metrics", "responses": {"200": {"description": "Text exposition format"}}}
            },
            "/api/v1/owners/{owner_id}/contacts/{contact_id}/send": {
                "post": {
                    "tags": ["Send"],
                    "summary": "Send one email to a contact",
                    "parameters": [owner_param(), id_param("contact_id")],
                    "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/SendRequest"}}}},
                    "responses": {
                        "201": {"description": "Sent", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/DeliveryRecord"}}}},
                        "400": error_ref("Missing subject or body"),
                        "404": error_ref("Unknown contact or template"),
                        "500": error_ref("Delivery failed; `delivery_id` names the failed record")
                    }
                }
            },
            "/api/v1/owners/{owner_id}/send/bulk": {
                "post": {
                    "tags": ["Send"],
                    "summary": "Send a template to many contacts",
                    "parameters": [owner_param()],
                    "requestBody": {"required": true, "content": {"application/json": {"schema": {"$ref": "#/components/schemas/BulkSendRequest"}}}},
                    "responses": {
                        "200": {"description": "Partial-success summary", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/BulkSendResponse"}}}},
                        "400": error_ref("No recipients or no template"),
                        "404": error_ref("Unknown template")
                    }
                }
            },
            "/api/v1/owners/{owner_id}/deliveries/{delivery_id}": {
                "get": {
                    "tags": ["Send"],
                    "summary": "Get a delivery record",
                    "parameters": [owner_param(), id_param("delivery_id")],
                    "responses": {
                        "200": {"description": "Delivery record", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/DeliveryRecord"}}}},
                        "404": error_ref("Not found")
                    }
                }
            },
            "/api/v1/owners/{owner_id}/campaigns/{campaign_id}/send": {
                "post": {
                    "tags": ["Campaigns"],
                    "summary": "Fan a campaign out to its recipients",
                    "parameters": [owner_param(), id_param("campaign_id")],
                    "responses": {
                        "200": {"description": "Fan-out report"},
                        "404": error_ref("Unknown campaign"),
                        "409": error_ref("Campaign already sent")
                    }
                }
            },
            "/api/v1/owners/{owner_id}/campaigns/{campaign_id}/stats": {
                "get": {
                    "tags": ["Campaigns"],
                    "summary": "Campaign open and click rates",
                    "parameters": [owner_param(), id_param("campaign_id")],
                    "responses": {"200": {"description": "Campaign stats"}, "404": error_ref("Unknown campaign")}
                }
            },
            "/api/v1/owners/{owner_id}/drafts": {
                "post": {
                    "tags": ["Drafts"],
                    "summary": "Stage a bulk send for review",
                    "parameters": [owner_param()],
                    "responses": {"201": {"description": "Draft preview"}, "400": error_ref("Invalid draft")}
                }
            },
            "/api/v1/owners/{owner_id}/drafts/{draft_id}": {
                "get": {
                    "tags": ["Drafts"],
                    "summary": "Preview every recipient of a draft",
                    "parameters": [owner_param(), id_param("draft_id")],
                    "responses": {"200": {"description": "Draft preview"}, "404": error_ref("Unknown or expired draft")}
                },
                "delete": {
                    "tags": ["Drafts"],
                    "summary": "Discard a draft",
                    "parameters": [owner_param(), id_param("draft_id")],
                    "responses": {"204": {"description": "Discarded"}, "404": error_ref("Unknown draft")}
                }
            },
            "/api/v1/owners/{owner_id}/drafts/{draft_id}/confirm": {
                "post": {
                    "tags": ["Drafts"],
                    "summary": "Send a draft",
                    "parameters": [owner_param(), id_param("draft_id")],
                    "responses": {
                        "200": {"description": "Partial-success summary", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/BulkSendResponse"}}}},
                        "404": error_ref("Unknown or expired draft")
                    }
                }
            },
            "/api/v1/owners/{owner_id}/templates/preview": {
                "post": {
                    "tags": ["Templates"],
                    "summary": "Resolve content for one contact without sending",
                    "parameters": [owner_param()],
                    "responses": {"200": {"description": "Resolved subject, body and HTML"}, "404": error_ref("Unknown contact or template")}
                }
            },
            "/api/v1/owners/{owner_id}/analytics": {
                "get": {
                    "tags": ["Analytics"],
                    "summary": "Engagement summary",
                    "parameters": [owner_param()],
                    "responses": {"200": {"description": "Totals, rates, per-template stats and recent emails"}}
                }
            },
            "/api/v1/owners/{owner_id}/analytics/export": {
                "get": {
                    "tags": ["Analytics"],
                    "summary": "Download delivery records",
                    "parameters": [
                        owner_param(),
                        {"name": "format", "in": "query", "schema": {"type": "string", "enum": ["csv", "json"], "default": "csv"}}
                    ],
                    "responses": {"200": {"description": "Attachment"}, "400": error_ref("Unsupported format")}
                }
            },
            "/webhooks/mailgun": {
                "post": {
                    "tags": ["Webhooks"],
                    "summary": "Provider event callback",
                    "security": [],
                    "requestBody": {"content": {"application/x-www-form-urlencoded": {"schema": {"$ref": "#/components/schemas/WebhookEvent"}}}},
                    "responses": {"200": {"description": "Acknowledged"}, "401": {"description": "Invalid signature"}}
                }
            }
        },
        "security": [{"ApiKeyAuth": []}, {"BearerAuth": []}],
        "components": {
            "securitySchemes": {
                "ApiKeyAuth": {"type": "apiKey", "in": "header", "name": "X-API-Key"},
                "BearerAuth": {"type": "http", "scheme": "bearer"}
            },
            "schemas": {
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": {"type": "string"},
                        "message": {"type": "string"},
                        "delivery_id": {"type": "string", "format": "uuid"}
                    }
                },
                "SendRequest": {
                    "type": "object",
                    "properties": {
                        "template_id": {"type": "string", "format": "uuid"},
                        "subject": {"type": "string"},
                        "body": {"type": "string"}
                    }
                },
                "BulkSendRequest": {
                    "type": "object",
                    "required": ["contact_ids", "template_id"],
                    "properties": {
                        "contact_ids": {"type": "array", "items": {"type": "string", "format": "uuid"}},
                        "template_id": {"type": "string", "format": "uuid"},
                        "scheduled_time": {"type": "string", "format": "date-time"}
                    }
                },
                "BulkSendResponse": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string"},
                        "message": {"type": "string"},
                        "sent_count": {"type": "integer"},
                        "scheduled_count": {"type": "integer"},
                        "errors": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "contact_id": {"type": "string", "format": "uuid"},
                                    "contact_name": {"type": "string"},
                                    "error": {"type": "string"}
                                }
                            }
                        }
                    }
                },
                "DeliveryRecord": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "contact_id": {"type": "string", "format": "uuid"},
                        "template_id": {"type": "string", "format": "uuid"},
                        "campaign_id": {"type": "string", "format": "uuid"},
                        "to_address": {"type": "string"},
                        "subject": {"type": "string"},
                        "body": {"type": "string"},
                        "status": {"type": "string", "enum": ["pending", "sent", "failed"]},
                        "tracking_id": {"type": "string"},
                        "scheduled_time": {"type": "string", "format": "date-time"},
                        "sent_at": {"type": "string", "format": "date-time"},
                        "opened": {"type": "boolean"},
                        "open_count": {"type": "integer"},
                        "clicked": {"type": "boolean"},
                        "click_count": {"type": "integer"}
                    }
                },
                "WebhookEvent": {
                    "type": "object",
                    "properties": {
                        "event": {"type": "string", "enum": ["opened", "clicked", "delivered", "failed"]},
                        "timestamp": {"type": "string"},
                        "token": {"type": "string"},
                        "signature": {"type": "string"},
                        "message-id": {"type": "string"},
                        "variables": {"type": "string", "description": "JSON object with `tracking_id`"},
                        "url": {"type": "string"}
                    }
                }
            }
        }
    })
}
