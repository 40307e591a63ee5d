use crate::{Error, Result};

/// Stage of the resampling pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    DiSampling,
    DiTemporalResampling,
    DiSpatialResampling,
}

/// Role a buffer plays in a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Uniforms,
    Lights,
    AliasTable,
    Surfaces,
    PrevSurfaces,
    PrevReservoirs,
    Reservoirs,

    /// Reservoirs read by a single spatial-reuse iteration.
    Input,

    /// Reservoirs written by a single spatial-reuse iteration.
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Reads only the entry of the pixel being processed (or uniform data).
    Read,

    /// Reads entries of arbitrary pixels.
    Gather,

    Write,

    /// Reads and writes only the entry of the pixel being processed.
    ReadWrite,
}

impl Access {
    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

impl Pass {
    pub fn label(self) -> &'static str {
        match self {
            Pass::DiSampling => "di_sampling",
            Pass::DiTemporalResampling => "di_temporal_resampling",
            Pass::DiSpatialResampling => "di_spatial_resampling",
        }
    }

    /// Returns the buffers this pass works on, in binding order; each pass
    /// additionally binds the scene's acceleration structure right after
    /// them.
    pub fn layout(self) -> &'static [(Resource, Access)] {
        use Access::*;
        use Resource::*;

        match self {
            Pass::DiSampling => &[
                (Uniforms, Read),
                (Lights, Gather),
                (AliasTable, Gather),
                (Surfaces, Read),
                (Reservoirs, Write),
            ],

            Pass::DiTemporalResampling => &[
                (Uniforms, Read),
                (Lights, Gather),
                (Surfaces, Read),
                (PrevSurfaces, Gather),
                (PrevReservoirs, Gather),
                (Reservoirs, ReadWrite),
            ],

            Pass::DiSpatialResampling => &[
                (Uniforms, Read),
                (Lights, Gather),
                (Surfaces, Gather),
                (Input, Gather),
                (Output, Write),
            ],
        }
    }
}

/// Buffers bound to a pass, validated against its layout.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingTable<B> {
    pass: Pass,
    buffers: Vec<B>,
}

impl<B> BindingTable<B>
where
    B: PartialEq,
{
    /// Matches given buffers against the pass' layout.
    ///
    /// Every resource of the layout has to be provided exactly once, and no
    /// buffer that gets written to may be bound anywhere else in the same
    /// pass.
    pub fn new(
        pass: Pass,
        entries: impl IntoIterator<Item = (Resource, B)>,
    ) -> Result<Self> {
        let mut entries: Vec<_> = entries.into_iter().collect();
        let mut buffers = Vec::with_capacity(pass.layout().len());

        for &(resource, _) in pass.layout() {
            let idx = entries
                .iter()
                .position(|(resource2, _)| *resource2 == resource)
                .ok_or_else(|| {
                    Error::InvalidBindings(format!(
                        "pass `{}` requires {resource:?}",
                        pass.label()
                    ))
                })?;

            buffers.push(entries.remove(idx).1);
        }

        if let Some((resource, _)) = entries.first() {
            return Err(Error::InvalidBindings(format!(
                "pass `{}` doesn't use {resource:?} (or it's bound twice)",
                pass.label()
            )));
        }

        for (lhs_idx, &(lhs, lhs_access)) in pass.layout().iter().enumerate() {
            if !lhs_access.writes() {
                continue;
            }

            for (rhs_idx, &(rhs, _)) in pass.layout().iter().enumerate() {
                if lhs_idx != rhs_idx && buffers[lhs_idx] == buffers[rhs_idx] {
                    return Err(Error::InvalidBindings(format!(
                        "pass `{}` writes into {lhs:?}, which is also bound \
                         as {rhs:?}",
                        pass.label()
                    )));
                }
            }
        }

        Ok(Self { pass, buffers })
    }
}

impl<B> BindingTable<B> {
    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn get(&self, resource: Resource) -> Option<&B> {
        self.iter()
            .find(|(resource2, _, _)| *resource2 == resource)
            .map(|(_, _, buffer)| buffer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resource, Access, &B)> + '_ {
        self.pass
            .layout()
            .iter()
            .zip(&self.buffers)
            .map(|(&(resource, access), buffer)| (resource, access, buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spatial(input: u32, output: u32) -> Result<BindingTable<u32>> {
        BindingTable::new(
            Pass::DiSpatialResampling,
            [
                (Resource::Output, output),
                (Resource::Uniforms, 1),
                (Resource::Lights, 2),
                (Resource::Surfaces, 3),
                (Resource::Input, input),
            ],
        )
    }

    #[test]
    fn valid() {
        let target = spatial(10, 11).unwrap();

        assert_eq!(Pass::DiSpatialResampling, target.pass());
        assert_eq!(Some(&10), target.get(Resource::Input));
        assert_eq!(Some(&11), target.get(Resource::Output));
        assert_eq!(None, target.get(Resource::AliasTable));

        let order: Vec<_> = target.iter().map(|(_, _, buf)| *buf).collect();

        assert_eq!(vec![1, 2, 3, 10, 11], order);
    }

    #[test]
    fn gathering_from_written_buffer() {
        assert!(matches!(spatial(10, 10), Err(Error::InvalidBindings(_))));

        // Sharing read-only buffers is fine
        let target = BindingTable::new(
            Pass::DiSampling,
            [
                (Resource::Uniforms, 1),
                (Resource::Lights, 2),
                (Resource::AliasTable, 2),
                (Resource::Surfaces, 3),
                (Resource::Reservoirs, 4),
            ],
        );

        assert!(target.is_ok());
    }

    #[test]
    fn missing_or_unexpected_resources() {
        let target = BindingTable::new(
            Pass::DiSampling,
            [(Resource::Uniforms, 1), (Resource::Lights, 2)],
        );

        assert!(matches!(target, Err(Error::InvalidBindings(_))));

        let target = BindingTable::new(
            Pass::DiSampling,
            [
                (Resource::Uniforms, 1),
                (Resource::Lights, 2),
                (Resource::AliasTable, 3),
                (Resource::Surfaces, 4),
                (Resource::Reservoirs, 5),
                (Resource::Input, 6),
            ],
        );

        assert!(matches!(target, Err(Error::InvalidBindings(_))));
    }
}
