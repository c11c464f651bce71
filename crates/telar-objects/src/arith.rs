//! Scalar arithmetic, comparison, and math-function objects.

use libm::{atan2f, atanf, cosf, expf, logf, powf, sinf, sqrtf, tanf};
use telar_core::{Message, PatchObject, PortSpec, Runtime};

/// Which binary operation a [`Binop`] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinopKind {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` — division by zero yields 0.
    Div,
    /// `%` — remainder; zero divisor yields 0.
    Mod,
    /// `pow`
    Pow,
    /// `min`
    Min,
    /// `max`
    Max,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&` — both operands nonzero.
    And,
    /// `||` — either operand nonzero.
    Or,
    /// `atan2`
    Atan2,
}

impl BinopKind {
    /// The patch label for this operation.
    pub fn label(self) -> &'static str {
        match self {
            BinopKind::Add => "+",
            BinopKind::Sub => "-",
            BinopKind::Mul => "*",
            BinopKind::Div => "/",
            BinopKind::Mod => "%",
            BinopKind::Pow => "pow",
            BinopKind::Min => "min",
            BinopKind::Max => "max",
            BinopKind::Gt => ">",
            BinopKind::Ge => ">=",
            BinopKind::Lt => "<",
            BinopKind::Le => "<=",
            BinopKind::Eq => "==",
            BinopKind::Ne => "!=",
            BinopKind::And => "&&",
            BinopKind::Or => "||",
            BinopKind::Atan2 => "atan2",
        }
    }

    fn apply(self, left: f32, right: f32) -> f32 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            BinopKind::Add => left + right,
            BinopKind::Sub => left - right,
            BinopKind::Mul => left * right,
            BinopKind::Div => {
                if right == 0.0 {
                    0.0
                } else {
                    left / right
                }
            }
            BinopKind::Mod => {
                if right == 0.0 {
                    0.0
                } else {
                    left % right
                }
            }
            BinopKind::Pow => powf(left, right),
            BinopKind::Min => left.min(right),
            BinopKind::Max => left.max(right),
            BinopKind::Gt => truth(left > right),
            BinopKind::Ge => truth(left >= right),
            BinopKind::Lt => truth(left < right),
            BinopKind::Le => truth(left <= right),
            BinopKind::Eq => truth(left == right),
            BinopKind::Ne => truth(left != right),
            BinopKind::And => truth(left != 0.0 && right != 0.0),
            BinopKind::Or => truth(left != 0.0 || right != 0.0),
            BinopKind::Atan2 => atan2f(left, right),
        }
    }
}

/// A scalar binary operator: hot left inlet, cold right operand.
///
/// A float on inlet 0 computes and emits; a bang recomputes with the last
/// left value; a float on inlet 1 replaces the stored right operand.
pub struct Binop {
    kind: BinopKind,
    left: f32,
    right: f32,
}

impl Binop {
    /// Creates the operator; the init message's first float seeds the right
    /// operand (default 0).
    pub fn new(kind: BinopKind, init: &Message) -> Self {
        Self {
            kind,
            left: 0.0,
            right: init.get_float(0).unwrap_or(0.0),
        }
    }
}

impl PatchObject for Binop {
    fn label(&self) -> &'static str {
        self.kind.label()
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 1)
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if let Some(f) = message.get_float(0) {
                    self.left = f;
                } else if !message.is_bang(0) {
                    return;
                }
                let result = self.kind.apply(self.left, self.right);
                rt.outlet(0, &Message::float(message.timestamp(), result));
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.right = f;
                }
            }
            _ => {}
        }
    }
}

/// Which unary function a [`Unary`] applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryKind {
    /// `abs`
    Abs,
    /// `sin`
    Sin,
    /// `cos`
    Cos,
    /// `tan`
    Tan,
    /// `atan`
    Atan,
    /// `exp`
    Exp,
    /// `log` — non-positive input yields -1000.
    Log,
    /// `sqrt` — negative input yields 0.
    Sqrt,
}

impl UnaryKind {
    /// The patch label for this function.
    pub fn label(self) -> &'static str {
        match self {
            UnaryKind::Abs => "abs",
            UnaryKind::Sin => "sin",
            UnaryKind::Cos => "cos",
            UnaryKind::Tan => "tan",
            UnaryKind::Atan => "atan",
            UnaryKind::Exp => "exp",
            UnaryKind::Log => "log",
            UnaryKind::Sqrt => "sqrt",
        }
    }

    fn apply(self, x: f32) -> f32 {
        match self {
            UnaryKind::Abs => x.abs(),
            UnaryKind::Sin => sinf(x),
            UnaryKind::Cos => cosf(x),
            UnaryKind::Tan => tanf(x),
            UnaryKind::Atan => atanf(x),
            UnaryKind::Exp => expf(x),
            UnaryKind::Log => {
                if x > 0.0 {
                    logf(x)
                } else {
                    -1000.0
                }
            }
            UnaryKind::Sqrt => {
                if x < 0.0 {
                    0.0
                } else {
                    sqrtf(x)
                }
            }
        }
    }
}

/// A scalar unary function.
pub struct Unary {
    kind: UnaryKind,
    last: f32,
}

impl Unary {
    /// Creates the function object.
    pub fn new(kind: UnaryKind) -> Self {
        Self { kind, last: 0.0 }
    }
}

impl PatchObject for Unary {
    fn label(&self) -> &'static str {
        self.kind.label()
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if let Some(f) = message.get_float(0) {
            self.last = f;
        } else if !message.is_bang(0) {
            return;
        }
        let result = self.kind.apply(self.last);
        rt.outlet(0, &Message::float(message.timestamp(), result));
    }
}
