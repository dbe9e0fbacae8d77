use crate::core::level0::concat_radiometers;
use crate::types::{
    Channel, HampError, HampResult, NavigationRecord, RadiometerModule, TimeIndexed, TimeRange,
    TimeSeries,
};

/// Aggregate of the post-processed channels of one flight.
///
/// Unpopulated channels are `None`; the accessors turn that into
/// [`HampError::ChannelMissing`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostProcessedDataset {
    pub navigation: Option<NavigationRecord>,
    pub radar: Option<TimeSeries>,
    pub radiometer_183: Option<TimeSeries>,
    pub radiometer_11990: Option<TimeSeries>,
    pub radiometer_kv: Option<TimeSeries>,
    pub column_water_vapour: Option<TimeSeries>,
}

fn required<'a, T>(channel: &'a Option<T>, name: Channel) -> HampResult<&'a T> {
    channel.as_ref().ok_or(HampError::ChannelMissing(name))
}

fn slice_channel<T: TimeIndexed>(channel: &Option<T>, range: &TimeRange) -> Option<T> {
    channel.as_ref().map(|c| c.slice(range))
}

impl PostProcessedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigation(&self) -> HampResult<&NavigationRecord> {
        required(&self.navigation, Channel::Navigation)
    }

    pub fn radar(&self) -> HampResult<&TimeSeries> {
        required(&self.radar, Channel::Radar)
    }

    pub fn column_water_vapour(&self) -> HampResult<&TimeSeries> {
        required(&self.column_water_vapour, Channel::ColumnWaterVapour)
    }

    pub fn radiometer(&self, module: RadiometerModule) -> HampResult<&TimeSeries> {
        required(self.radiometer_slot(module), Channel::Radiometer(module))
    }

    fn radiometer_slot(&self, module: RadiometerModule) -> &Option<TimeSeries> {
        match module {
            RadiometerModule::G183 => &self.radiometer_183,
            RadiometerModule::WF11990 => &self.radiometer_11990,
            RadiometerModule::KV => &self.radiometer_kv,
        }
    }

    pub fn set_radiometer(&mut self, module: RadiometerModule, series: TimeSeries) {
        let slot = match module {
            RadiometerModule::G183 => &mut self.radiometer_183,
            RadiometerModule::WF11990 => &mut self.radiometer_11990,
            RadiometerModule::KV => &mut self.radiometer_kv,
        };
        *slot = Some(series);
    }

    pub fn is_populated(&self, channel: Channel) -> bool {
        match channel {
            Channel::Navigation => self.navigation.is_some(),
            Channel::Radar => self.radar.is_some(),
            Channel::Radiometer(module) => self.radiometer_slot(module).is_some(),
            Channel::ColumnWaterVapour => self.column_water_vapour.is_some(),
        }
    }

    /// Populated channels in a fixed order
    pub fn channels(&self) -> Vec<Channel> {
        let mut all = vec![Channel::Navigation, Channel::Radar];
        all.extend(RadiometerModule::ALL.iter().map(|&m| Channel::Radiometer(m)));
        all.push(Channel::ColumnWaterVapour);
        all.into_iter().filter(|&c| self.is_populated(c)).collect()
    }

    /// Same inclusive time range applied to every populated channel.
    /// Returns a new aggregate; `self` is never modified.
    pub fn slice(&self, range: &TimeRange) -> PostProcessedDataset {
        PostProcessedDataset {
            navigation: slice_channel(&self.navigation, range),
            radar: slice_channel(&self.radar, range),
            radiometer_183: slice_channel(&self.radiometer_183, range),
            radiometer_11990: slice_channel(&self.radiometer_11990, range),
            radiometer_kv: slice_channel(&self.radiometer_kv, range),
            column_water_vapour: slice_channel(&self.column_water_vapour, range),
        }
    }

    /// All radiometer modules joined along frequency
    pub fn concatenated_radiometers(&self) -> HampResult<TimeSeries> {
        let modules = RadiometerModule::ALL
            .iter()
            .map(|&m| self.radiometer(m))
            .collect::<HampResult<Vec<_>>>()?;
        concat_radiometers(&modules)
    }
}
