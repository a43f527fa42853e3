use super::Relu;

#[derive(Debug, Clone, Copy)]
pub enum ActFn {
    Relu(Relu),
}

impl ActFn {
    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.df(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu() {
        let act_fn = ActFn::relu();

        assert_eq!(act_fn.f(-2.), 0.);
        assert_eq!(act_fn.f(3.), 3.);
        assert_eq!(act_fn.df(-2.), 0.);
        assert_eq!(act_fn.df(0.), 0.);
        assert_eq!(act_fn.df(3.), 1.);
    }
}
