//! Dense 2D buffers.

/// Row-major 2D grid, indexed `(x, y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Creates a grid filled with `value`.
    #[must_use]
    pub fn new(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Creates a grid by evaluating `f(x, y)` for every cell.
    #[must_use]
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    /// Gets the value at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.index(x, y)]
    }

    /// Sets the value at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of bounds.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        assert!(x < self.width && y < self.height, "grid index ({x}, {y}) out of bounds");
        y * self.width + x
    }

    /// Width in cells.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// All cells, row by row.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to all cells, row by row.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}
