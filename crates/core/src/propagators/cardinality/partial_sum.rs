/// Prefix sums over the occurrence bounds of a contiguous range of values, padded with two unit
/// elements on either side so that the Hall interval sweeps never step outside of the table.
///
/// Next to the sums, `skip_links` connects every run of zero elements to the closest non-zero
/// element, which lets a bound jump over values that contribute nothing.
#[derive(Clone, Debug)]
pub(crate) struct PartialSum {
    /// The value stored at index 0, three below the first real value.
    offset: i32,
    /// The last value with a (padding) element.
    last_value: i32,
    sums: Box<[i32]>,
    skip_links: Box<[usize]>,
}

impl PartialSum {
    pub(crate) fn new(first_value: i32, count: usize) -> Self {
        PartialSum {
            offset: first_value - 3,
            last_value: first_value + count as i32 + 1,
            sums: vec![0; count + 5].into_boxed_slice(),
            skip_links: vec![0; count + 5].into_boxed_slice(),
        }
    }

    /// Recomputes the sums for `elements`, the weights of the consecutive values starting at
    /// [`PartialSum::min_value`].
    pub(crate) fn compute(&mut self, elements: impl IntoIterator<Item = i32>) {
        self.sums[0] = 0;
        self.sums[1] = 1;
        self.sums[2] = 2;
        let mut index = 2;
        for element in elements {
            self.sums[index + 1] = self.sums[index] + element;
            index += 1;
        }
        self.sums[index + 1] = self.sums[index] + 1;
        self.sums[index + 2] = self.sums[index + 1] + 1;

        let mut i = self.sums.len() - 2;
        let mut j = i + 1;
        while i > 0 {
            while self.sums[i] == self.sums[i - 1] {
                self.skip_links[i] = j;
                i -= 1;
            }
            self.skip_links[j] = i;
            j = i;
            i -= 1;
        }
        self.skip_links[j] = 0;
    }

    /// The sum of the elements of the values in `[from, to]`. When `from > to` the result is the
    /// negated sum of `[to, from]`.
    pub(crate) fn sum(&self, from: i32, to: i32) -> i32 {
        if from <= to {
            self.sums[self.index(to)] - self.sums[self.index(from) - 1]
        } else {
            self.sums[self.index(to) - 1] - self.sums[self.index(from)]
        }
    }

    pub(crate) fn min_value(&self) -> i32 {
        self.offset + 3
    }

    pub(crate) fn max_value(&self) -> i32 {
        self.last_value - 2
    }

    /// The value just below the padding on the left.
    pub(crate) fn lowest_bound(&self) -> i32 {
        self.offset + 1
    }

    /// The value just above the padding on the right.
    pub(crate) fn highest_bound(&self) -> i32 {
        self.last_value + 1
    }

    /// Moves `value` up to the next value with a non-zero element, if its own element is zero.
    pub(crate) fn skip_null_elements_right(&self, value: i32) -> i32 {
        let index = self.index(value);
        let link = self.skip_links[index];
        if link < index {
            value
        } else {
            link as i32 + self.offset
        }
    }

    /// Moves `value` down to the previous value with a non-zero element, if its own element is
    /// zero.
    pub(crate) fn skip_null_elements_left(&self, value: i32) -> i32 {
        let index = self.index(value);
        let link = self.skip_links[index];
        if link > index {
            self.skip_links[link] as i32 + self.offset
        } else {
            value
        }
    }

    fn index(&self, value: i32) -> usize {
        (value - self.offset) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_cover_closed_intervals() {
        let mut partial_sum = PartialSum::new(5, 3);
        partial_sum.compute([1, 0, 2]);

        assert_eq!(5, partial_sum.min_value());
        assert_eq!(7, partial_sum.max_value());
        assert_eq!(3, partial_sum.sum(5, 7));
        assert_eq!(1, partial_sum.sum(5, 5));
        assert_eq!(0, partial_sum.sum(6, 6));
        assert_eq!(2, partial_sum.sum(6, 7));
    }

    #[test]
    fn reversed_intervals_give_negated_sums() {
        let mut partial_sum = PartialSum::new(5, 3);
        partial_sum.compute([1, 0, 2]);

        assert_eq!(-1, partial_sum.sum(6, 5));
        assert_eq!(-3, partial_sum.sum(8, 6));
    }

    #[test]
    fn zero_elements_are_skipped() {
        let mut partial_sum = PartialSum::new(5, 3);
        partial_sum.compute([1, 0, 2]);

        assert_eq!(5, partial_sum.skip_null_elements_right(5));
        assert_eq!(7, partial_sum.skip_null_elements_right(6));
        assert_eq!(5, partial_sum.skip_null_elements_left(6));
        assert_eq!(7, partial_sum.skip_null_elements_left(7));
    }
}
