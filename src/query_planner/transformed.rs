/// Result of a rewrite: `Yes` when a new tree was allocated, `No` when the
/// input came back untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed<T> {
    Yes(T),
    No(T),
}

impl<T> Transformed<T> {
    pub fn get_expr(self) -> T {
        match self {
            Transformed::Yes(expr) | Transformed::No(expr) => expr,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Transformed::Yes(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        match self {
            Transformed::Yes(expr) => Transformed::Yes(f(expr)),
            Transformed::No(expr) => Transformed::No(f(expr)),
        }
    }
}
