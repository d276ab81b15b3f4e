/*!
# Built-in Policies

One module per rewrite shape; the table below binds each instrumented
library to a shape and its companion package.
*/

pub mod closure;
pub mod grpc;
pub mod nethttp;
pub mod register;
pub mod substitute;

use super::{Library, Policy, Transformer};
use closure::ClosureWrap;
use register::Registration;
use substitute::Substitution;

static SQL: Substitution = Substitution {
    functions: &["Open", "OpenDB"],
    context: false,
};

static GIN: Registration = Registration {
    constructors: &["Default", "New"],
    method: "Use",
    handler: "Middleware",
    call: true,
};

static ECHO: Registration = Registration {
    constructors: &["New"],
    method: "Use",
    handler: "Middleware",
    call: true,
};

static GORILLA_MUX: Registration = Registration {
    constructors: &["NewRouter"],
    method: "Use",
    handler: "Middleware",
    call: false,
};

static CHI: Registration = Registration {
    constructors: &["NewRouter"],
    method: "Use",
    handler: "Middleware",
    call: false,
};

static FIBER: Registration = Registration {
    constructors: &["New"],
    method: "Use",
    handler: "Middleware",
    call: true,
};

static GO_REDIS: Registration = Registration {
    constructors: &[
        "NewClient",
        "NewClusterClient",
        "NewFailoverClient",
        "NewUniversalClient",
    ],
    method: "AddHook",
    handler: "NewHook",
    call: true,
};

static LOGRUS: Registration = Registration {
    constructors: &["New"],
    method: "AddHook",
    handler: "NewHook",
    call: true,
};

static SARAMA: ClosureWrap = ClosureWrap {
    factories: &[
        "NewClient",
        "NewSyncProducer",
        "NewAsyncProducer",
        "NewConsumer",
        "NewConsumerGroup",
        "NewClusterAdmin",
        "NewSyncProducerFromClient",
        "NewAsyncProducerFromClient",
        "NewConsumerFromClient",
        "NewConsumerGroupFromClient",
        "NewClusterAdminFromClient",
    ],
    observer: "Observe",
};

/// The built-in transformers in registration order.
pub fn builtin() -> Vec<Transformer> {
    vec![
        Transformer {
            name: "nethttp",
            family: "nethttp",
            description: "net/http handlers, servers and client calls",
            libraries: &[Library {
                path: "net/http",
                companion: "net/http",
            }],
            policy: Policy::NetHttp,
            semantic: None,
            alias_override: Some("wefthttp"),
        },
        Transformer {
            name: "sql",
            family: "sql",
            description: "database/sql connection constructors",
            libraries: &[Library {
                path: "database/sql",
                companion: "database/sql",
            }],
            policy: Policy::Substitute(&SQL),
            semantic: None,
            alias_override: Some("weftsql"),
        },
        Transformer {
            name: "gin",
            family: "gin",
            description: "gin engine middleware",
            libraries: &[Library {
                path: "github.com/gin-gonic/gin",
                companion: "github.com/gin-gonic/gin/weftgin",
            }],
            policy: Policy::Register(&GIN),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "echo",
            family: "echo",
            description: "echo server middleware",
            libraries: &[
                Library {
                    path: "github.com/labstack/echo/v4",
                    companion: "github.com/labstack/echo/v4/weftecho",
                },
                Library {
                    path: "github.com/labstack/echo",
                    companion: "github.com/labstack/echo/weftecho",
                },
            ],
            policy: Policy::Register(&ECHO),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "gorillamux",
            family: "gorillamux",
            description: "gorilla/mux router middleware",
            libraries: &[Library {
                path: "github.com/gorilla/mux",
                companion: "github.com/gorilla/mux/weftmux",
            }],
            policy: Policy::Register(&GORILLA_MUX),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "chi",
            family: "chi",
            description: "chi router middleware",
            libraries: &[
                Library {
                    path: "github.com/go-chi/chi/v5",
                    companion: "github.com/go-chi/chi/v5/weftchi",
                },
                Library {
                    path: "github.com/go-chi/chi",
                    companion: "github.com/go-chi/chi/weftchi",
                },
            ],
            policy: Policy::Register(&CHI),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "fiber",
            family: "fiber",
            description: "fiber app middleware",
            libraries: &[Library {
                path: "github.com/gofiber/fiber/v2",
                companion: "github.com/gofiber/fiber/v2/weftfiber",
            }],
            policy: Policy::Register(&FIBER),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "goredis-v9",
            family: "goredis",
            description: "go-redis v9 client hooks",
            libraries: &[Library {
                path: "github.com/redis/go-redis/v9",
                companion: "github.com/redis/go-redis/v9/weftredis",
            }],
            policy: Policy::Register(&GO_REDIS),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "goredis-v8",
            family: "goredis",
            description: "go-redis v8 client hooks",
            libraries: &[Library {
                path: "github.com/go-redis/redis/v8",
                companion: "github.com/go-redis/redis/v8/weftredis",
            }],
            policy: Policy::Register(&GO_REDIS),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "grpc",
            family: "grpc",
            description: "gRPC server and client interceptors",
            libraries: &[Library {
                path: "google.golang.org/grpc",
                companion: "google.golang.org/grpc/weftgrpc",
            }],
            policy: Policy::Grpc,
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "logrus",
            family: "logrus",
            description: "logrus logger hooks",
            libraries: &[Library {
                path: "github.com/sirupsen/logrus",
                companion: "github.com/sirupsen/logrus/weftlogrus",
            }],
            policy: Policy::Register(&LOGRUS),
            semantic: None,
            alias_override: None,
        },
        Transformer {
            name: "sarama",
            family: "sarama",
            description: "Kafka clients from IBM/sarama",
            libraries: &[Library {
                path: "github.com/IBM/sarama",
                companion: "github.com/IBM/sarama/weftsarama",
            }],
            policy: Policy::ClosureWrap(&SARAMA),
            semantic: Some(closure::resolve_results),
            alias_override: None,
        },
        Transformer {
            name: "sarama-legacy",
            family: "sarama",
            description: "Kafka clients from Shopify/sarama",
            libraries: &[Library {
                path: "github.com/Shopify/sarama",
                companion: "github.com/Shopify/sarama/weftsarama",
            }],
            policy: Policy::ClosureWrap(&SARAMA),
            semantic: Some(closure::resolve_results),
            alias_override: None,
        },
    ]
}
