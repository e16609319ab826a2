//! Arithmetic combination of signals.
//!
//! Any node can be an operand of any other; the combination is itself a
//! node with an operator tag and two parameter slots, evaluated
//! elementwise each block. Its channel count expands to the wider
//! operand, the narrower one wrapping cyclically like any short list.

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const A: usize = 0;
const B: usize = 1;

/// Operator tag for [`Arith`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// Unary negation of `a`; `b` is ignored.
    Neg,
}

/// Elementwise arithmetic over one or two operands.
pub struct Arith {
    op: ArithOp,
    a: ParamValue,
    b: ParamValue,
    mul: ParamValue,
    add: ParamValue,
}

impl Arith {
    pub fn new(op: ArithOp) -> Self {
        Self {
            op,
            a: ParamValue::Scalar(0.0),
            b: ParamValue::Scalar(0.0),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
        }
    }

    /// `a + b`
    pub fn sum(a: impl Into<ParamValue>, b: impl Into<ParamValue>) -> Self {
        Self::new(ArithOp::Add).a(a).b(b)
    }

    /// `a - b`
    pub fn diff(a: impl Into<ParamValue>, b: impl Into<ParamValue>) -> Self {
        Self::new(ArithOp::Sub).a(a).b(b)
    }

    /// `a * b`
    pub fn product(a: impl Into<ParamValue>, b: impl Into<ParamValue>) -> Self {
        Self::new(ArithOp::Mul).a(a).b(b)
    }

    /// `a / b` (0.0 where `b` is 0)
    pub fn quotient(a: impl Into<ParamValue>, b: impl Into<ParamValue>) -> Self {
        Self::new(ArithOp::Div).a(a).b(b)
    }

    /// `a ^ b`
    pub fn power(a: impl Into<ParamValue>, b: impl Into<ParamValue>) -> Self {
        Self::new(ArithOp::Pow).a(a).b(b)
    }

    /// `-a`
    pub fn neg(a: impl Into<ParamValue>) -> Self {
        Self::new(ArithOp::Neg).a(a)
    }

    pub fn a(mut self, a: impl Into<ParamValue>) -> Self {
        self.a = a.into();
        self
    }

    pub fn b(mut self, b: impl Into<ParamValue>) -> Self {
        self.b = b.into();
        self
    }

    pub fn mul(mut self, mul: impl Into<ParamValue>) -> Self {
        self.mul = mul.into();
        self
    }

    pub fn add(mut self, add: impl Into<ParamValue>) -> Self {
        self.add = add.into();
        self
    }
}

impl Generator for Arith {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &Inputs,
        _res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        let op = self.op;
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let a = inputs.param(A, i);
            let b = inputs.param(B, i);
            for j in 0..buf.len() {
                let (x, y) = (a.at(j), b.at(j));
                buf[j] = match op {
                    ArithOp::Add => x + y,
                    ArithOp::Sub => x - y,
                    ArithOp::Mul => x * y,
                    ArithOp::Div => {
                        if y != 0.0 {
                            x / y
                        } else {
                            0.0
                        }
                    }
                    ArithOp::Pow => x.powf(y),
                    ArithOp::Neg => -x,
                };
            }
        }
        Ok(())
    }
}

impl IntoNodeDef for Arith {
    fn into_def(self) -> NodeDef {
        let a = self.a.clone();
        let b = self.b.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("a", a)
            .param("b", b)
            .mul(mul)
            .add(add)
    }
}
