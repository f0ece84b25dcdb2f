use crate::{
    config::{Configuration, Policy, SweepConfig},
    error::ConfigError,
};

/// Cross product of the sweep axes.
///
/// Enumeration order is block size, then associativity, then policy,
/// with policy varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpace {
    block_sizes: Vec<usize>,
    associativities: Vec<usize>,
    policies: Vec<Policy>,
}

pub(crate) fn check_axes(
    block_sizes: &[usize],
    associativities: &[usize],
    policies: &[Policy],
) -> Result<(), ConfigError> {
    if block_sizes.is_empty() {
        return Err(ConfigError::EmptyAxis("block sizes"));
    }
    if associativities.is_empty() {
        return Err(ConfigError::EmptyAxis("associativities"));
    }
    if policies.is_empty() {
        return Err(ConfigError::EmptyAxis("policies"));
    }
    if let Some(&value) = block_sizes.iter().find(|&&b| b == 0) {
        return Err(ConfigError::NonPositive {
            axis: "block size",
            value,
        });
    }
    if let Some(&value) = associativities.iter().find(|&&a| a == 0) {
        return Err(ConfigError::NonPositive {
            axis: "associativity",
            value,
        });
    }
    Ok(())
}

impl ConfigSpace {
    pub fn new(
        block_sizes: Vec<usize>,
        associativities: Vec<usize>,
        policies: Vec<Policy>,
    ) -> Result<Self, ConfigError> {
        check_axes(&block_sizes, &associativities, &policies)?;
        Ok(Self {
            block_sizes,
            associativities,
            policies,
        })
    }

    pub fn from_config(config: &SweepConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.block_sizes.clone(),
            config.associativities.clone(),
            config.policies.clone(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.block_sizes.len() * self.associativities.len() * self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Each call starts a fresh enumeration.
    pub fn iter(&self) -> impl Iterator<Item = Configuration> + '_ {
        self.block_sizes.iter().flat_map(move |&block_size| {
            self.associativities.iter().flat_map(move |&associativity| {
                self.policies.iter().map(move |&policy| Configuration {
                    block_size,
                    associativity,
                    policy,
                })
            })
        })
    }

    #[must_use]
    pub fn configurations(&self) -> Vec<Configuration> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigSpace;
    use crate::config::{Configuration, Policy};
    use crate::error::ConfigError;
    use pretty_assertions_sorted as diff;
    use std::collections::HashSet;

    #[test]
    fn cross_product_is_complete_and_distinct() -> anyhow::Result<()> {
        let space = ConfigSpace::new(vec![4, 8, 16, 32, 64], vec![1, 2, 4, 8], Policy::ALL.to_vec())?;
        let configs = space.configurations();
        diff::assert_eq!(configs.len(), 5 * 4 * 3);
        diff::assert_eq!(space.len(), configs.len());
        let unique: HashSet<Configuration> = configs.iter().copied().collect();
        diff::assert_eq!(unique.len(), configs.len());
        Ok(())
    }

    #[test]
    fn policy_varies_fastest() -> anyhow::Result<()> {
        let space = ConfigSpace::new(vec![4, 8], vec![1, 2], vec![Policy::Fifo, Policy::Plru])?;
        let order: Vec<_> = space
            .iter()
            .map(|c| (c.block_size, c.associativity, c.policy))
            .collect();
        diff::assert_eq!(
            order,
            vec![
                (4, 1, Policy::Fifo),
                (4, 1, Policy::Plru),
                (4, 2, Policy::Fifo),
                (4, 2, Policy::Plru),
                (8, 1, Policy::Fifo),
                (8, 1, Policy::Plru),
                (8, 2, Policy::Fifo),
                (8, 2, Policy::Plru),
            ]
        );
        Ok(())
    }

    #[test]
    fn enumeration_is_restartable() -> anyhow::Result<()> {
        let space = ConfigSpace::new(vec![16], vec![1, 4], Policy::ALL.to_vec())?;
        diff::assert_eq!(space.configurations(), space.iter().collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn empty_axis_is_rejected() {
        assert!(matches!(
            ConfigSpace::new(vec![4], vec![], vec![Policy::Fifo]),
            Err(ConfigError::EmptyAxis("associativities"))
        ));
        assert!(matches!(
            ConfigSpace::new(vec![4], vec![1], vec![]),
            Err(ConfigError::EmptyAxis("policies"))
        ));
        assert!(matches!(
            ConfigSpace::new(vec![0], vec![1], vec![Policy::Fifo]),
            Err(ConfigError::NonPositive {
                axis: "block size",
                value: 0
            })
        ));
    }
}
