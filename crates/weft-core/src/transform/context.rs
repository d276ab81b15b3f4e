//! Request-scoped context inference.
//!
//! Generated client calls need a `context.Context`. It is derived from the
//! parameters of the nearest enclosing function or function literal; when no
//! parameter carries one the placeholder `nil` is used.

use crate::syntax::{build, Expr, ExprId, FuncSig, ImportTable, Tree};

const CONTEXT: &[&str] = &["context"];
const NET_HTTP: &[&str] = &["net/http"];
const GIN: &[&str] = &["github.com/gin-gonic/gin"];
const ECHO: &[&str] = &["github.com/labstack/echo", "github.com/labstack/echo/v4"];
const FIBER: &[&str] = &["github.com/gofiber/fiber/v2"];

/// A parameter from which a context can be derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Carrier {
    /// `ctx context.Context`
    Context(String),
    /// `r *http.Request`
    Request(String),
    /// `c *gin.Context`
    Gin(String),
    /// `c echo.Context`
    Echo(String),
    /// `c *fiber.Ctx`
    Fiber(String),
}

impl Carrier {
    fn rank(&self) -> u8 {
        match self {
            Carrier::Context(_) => 0,
            Carrier::Request(_) => 1,
            Carrier::Gin(_) => 2,
            Carrier::Echo(_) => 3,
            Carrier::Fiber(_) => 4,
        }
    }

    /// Go expression yielding the context.
    pub fn expr_text(&self) -> String {
        match self {
            Carrier::Context(n) => n.clone(),
            Carrier::Request(n) => format!("{n}.Context()"),
            Carrier::Gin(n) => format!("{n}.Request.Context()"),
            Carrier::Echo(n) => format!("{n}.Request().Context()"),
            Carrier::Fiber(n) => format!("{n}.UserContext()"),
        }
    }
}

/// Highest-priority carrier among the parameters.
pub fn carrier(tree: &Tree, sig: &FuncSig, imports: &ImportTable) -> Option<Carrier> {
    sig.params
        .iter()
        .filter_map(|field| {
            let name = field.names.iter().find(|n| n.as_str() != "_")?;
            classify(tree, field.ty, imports, name)
        })
        .min_by_key(Carrier::rank)
}

fn classify(tree: &Tree, ty: ExprId, imports: &ImportTable, name: &str) -> Option<Carrier> {
    let name = name.to_string();
    match tree.expr(ty) {
        Expr::Star(inner) => {
            let (pkg, sel) = tree.qualified(*inner)?;
            match sel {
                "Request" if imports.resolves_to(pkg, NET_HTTP) => Some(Carrier::Request(name)),
                "Context" if imports.resolves_to(pkg, GIN) => Some(Carrier::Gin(name)),
                "Ctx" if imports.resolves_to(pkg, FIBER) => Some(Carrier::Fiber(name)),
                _ => None,
            }
        }
        _ => {
            let (pkg, sel) = tree.qualified(ty)?;
            match sel {
                "Context" if imports.resolves_to(pkg, CONTEXT) => Some(Carrier::Context(name)),
                "Context" if imports.resolves_to(pkg, ECHO) => Some(Carrier::Echo(name)),
                _ => None,
            }
        }
    }
}

/// Build the context expression for a call site, `nil` when nothing in
/// scope carries one.
pub fn context_expr(tree: &mut Tree, sig: &FuncSig, imports: &ImportTable) -> ExprId {
    match carrier(tree, sig, imports) {
        None => build::ident(tree, "nil"),
        Some(Carrier::Context(n)) => build::ident(tree, &n),
        Some(Carrier::Request(n)) => build::qualified_call(tree, &n, "Context", Vec::new()),
        Some(Carrier::Fiber(n)) => build::qualified_call(tree, &n, "UserContext", Vec::new()),
        Some(Carrier::Gin(n)) => {
            let request = build::selector(tree, &n, "Request");
            let fun = tree.add_expr(Expr::Selector {
                x: request,
                sel: "Context".to_string(),
                broken: false,
            });
            build::call(tree, fun, Vec::new())
        }
        Some(Carrier::Echo(n)) => {
            let request = build::qualified_call(tree, &n, "Request", Vec::new());
            let fun = tree.add_expr(Expr::Selector {
                x: request,
                sel: "Context".to_string(),
                broken: false,
            });
            build::call(tree, fun, Vec::new())
        }
    }
}
