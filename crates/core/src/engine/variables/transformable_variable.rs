/// Variables which can be transformed into views without posting constraints.
pub trait TransformableVariable<View> {
    /// A view of `scale * self`. Panics when `scale` is zero.
    fn scaled(&self, scale: i32) -> View;

    /// A view of `self + offset`.
    fn offset(&self, offset: i32) -> View;
}
