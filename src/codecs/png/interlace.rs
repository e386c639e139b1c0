//! Adam7 pass geometry.

/// One of the seven Adam7 sub-images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Pass {
    pub x_origin: usize,
    pub y_origin: usize,
    pub x_step: usize,
    pub y_step: usize,
}

pub(crate) const ADAM7: [Pass; 7] = [
    Pass { x_origin: 0, y_origin: 0, x_step: 8, y_step: 8 },
    Pass { x_origin: 4, y_origin: 0, x_step: 8, y_step: 8 },
    Pass { x_origin: 0, y_origin: 4, x_step: 4, y_step: 8 },
    Pass { x_origin: 2, y_origin: 0, x_step: 4, y_step: 4 },
    Pass { x_origin: 0, y_origin: 2, x_step: 2, y_step: 4 },
    Pass { x_origin: 1, y_origin: 0, x_step: 2, y_step: 2 },
    Pass { x_origin: 0, y_origin: 1, x_step: 1, y_step: 2 },
];

impl Pass {
    /// Reduced (width, height) of this pass for a full image of the given size.
    pub(crate) fn size(&self, width: usize, height: usize) -> (usize, usize) {
        let w = (width + self.x_step - 1).saturating_sub(self.x_origin) / self.x_step;
        let h = (height + self.y_step - 1).saturating_sub(self.y_origin) / self.y_step;
        (w, h)
    }

    /// Final image coordinate of reduced pixel `(x, y)`.
    pub(crate) fn place(&self, x: usize, y: usize) -> (usize, usize) {
        (x * self.x_step + self.x_origin, y * self.y_step + self.y_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_sizes_cover_every_pixel() {
        for width in 1..=20 {
            for height in 1..=20 {
                let total: usize = ADAM7
                    .iter()
                    .map(|p| {
                        let (w, h) = p.size(width, height);
                        w * h
                    })
                    .sum();
                assert_eq!(total, width * height, "{width}x{height}");
            }
        }
    }

    #[test]
    fn small_images_skip_passes() {
        assert_eq!(ADAM7[1].size(4, 4), (0, 1));
        assert_eq!(ADAM7[0].size(1, 1), (1, 1));
        assert_eq!(ADAM7[6].size(1, 1), (1, 0));
    }

    #[test]
    fn placement() {
        assert_eq!(ADAM7[3].place(1, 2), (6, 8));
        assert_eq!(ADAM7[6].place(3, 0), (3, 1));
    }
}
