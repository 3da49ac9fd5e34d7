//! Parquet file writer
use crate::errors::PersistenceError;
use crate::DfeReport;
use arrow::array::{ArrayRef, Float32Builder, UInt32Builder};
#[cfg(feature = "raw_iq")]
use arrow::array::{ListBuilder, UInt8Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

// ---------- Schema Creation ----------

/// Create the report schema
fn create_report_schema() -> Schema {
    let mut fields = vec![
        Field::new("frequency", DataType::UInt32, false),
        Field::new("switch_spacing_ns", DataType::UInt32, false),
        Field::new("sample_spacing_ns", DataType::UInt32, false),
        Field::new("phase", DataType::Float32, false),
        Field::new("azimuth", DataType::Float32, false),
        Field::new("filtered_azimuth", DataType::Float32, false),
        Field::new("elevation", DataType::Float32, true),
        Field::new("filtered_elevation", DataType::Float32, true),
        Field::new("samples_used", DataType::UInt32, false),
    ];

    #[cfg(feature = "raw_iq")]
    {
        let list_of = |data_type| DataType::List(Arc::new(Field::new("item", data_type, true)));
        fields.push(Field::new("iq_antenna", list_of(DataType::UInt8), false));
        fields.push(Field::new("iq_time", list_of(DataType::UInt32), false));
        fields.push(Field::new("iq_i", list_of(DataType::Float32), false));
        fields.push(Field::new("iq_q", list_of(DataType::Float32), false));
    }
    Schema::new(fields)
}

/// A batch writer to write batches of reports to a Parquet file.
pub struct BatchWriter {
    writer: Option<ArrowWriter<File>>,
    schema: Arc<Schema>,
    file_path: PathBuf,
}

impl BatchWriter {
    pub fn new(file_path: PathBuf) -> Result<Self, PersistenceError> {
        let file = File::create(&file_path)?;
        let schema = Arc::new(create_report_schema());
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .map_err(|e| PersistenceError::Parquet(e.to_string()))?;
        Ok(Self {
            writer: Some(writer),
            schema,
            file_path,
        })
    }

    /// Write a record batch
    fn write(&mut self, batch: RecordBatch) -> Result<(), PersistenceError> {
        if let Some(writer) = &mut self.writer {
            writer
                .write(&batch)
                .map_err(|e| PersistenceError::Parquet(e.to_string()))
        } else {
            Err(PersistenceError::Parquet(
                "Writer has been finalized".into(),
            ))
        }
    }

    /// Finalize the writer by taking ownership and closing it.
    ///
    /// Returns the size of the closed file.
    pub fn finalize(&mut self) -> Result<u64, PersistenceError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| PersistenceError::Parquet("Writer already finalized".into()))?;
        let metadata = writer
            .close()
            .map_err(|e| PersistenceError::Parquet(e.to_string()))?;
        log::trace!("Closed parquet file holding {} rows", metadata.num_rows);

        Ok(std::fs::metadata(&self.file_path)?.len())
    }

    /// Add a batch of reports.
    pub fn add_batch(&mut self, data: &[DfeReport]) -> Result<(), PersistenceError> {
        let mut frequency = UInt32Builder::new();
        let mut switch_spacing = UInt32Builder::new();
        let mut sample_spacing = UInt32Builder::new();
        let mut phase = Float32Builder::new();
        let mut azimuth = Float32Builder::new();
        let mut filtered_azimuth = Float32Builder::new();
        let mut elevation = Float32Builder::new();
        let mut filtered_elevation = Float32Builder::new();
        let mut samples_used = UInt32Builder::new();

        #[cfg(feature = "raw_iq")]
        let (mut iq_antenna, mut iq_time, mut iq_i, mut iq_q) = (
            ListBuilder::new(UInt8Builder::new()),
            ListBuilder::new(UInt32Builder::new()),
            ListBuilder::new(Float32Builder::new()),
            ListBuilder::new(Float32Builder::new()),
        );

        for d in data {
            let result = &d.result;
            frequency.append_value(result.frequency);
            switch_spacing.append_value(d.timing.switch_spacing_ns);
            sample_spacing.append_value(d.timing.sample_spacing_ns);
            phase.append_value(result.phase);
            azimuth.append_value(result.raw.azimuth);
            filtered_azimuth.append_value(result.filtered.azimuth);
            elevation.append_option(result.raw.elevation);
            filtered_elevation.append_option(result.filtered.elevation);
            samples_used.append_value(result.samples_used as u32);

            #[cfg(feature = "raw_iq")]
            {
                for line in super::iq_timeline(d) {
                    iq_antenna.values().append_value(line.antenna_id.0);
                    iq_time.values().append_value(line.time_unit);
                    iq_i.values().append_value(line.sample.re);
                    iq_q.values().append_value(line.sample.im);
                }
                iq_antenna.append(true);
                iq_time.append(true);
                iq_i.append(true);
                iq_q.append(true);
            }
        }

        #[allow(unused_mut)]
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(frequency.finish()),
            Arc::new(switch_spacing.finish()),
            Arc::new(sample_spacing.finish()),
            Arc::new(phase.finish()),
            Arc::new(azimuth.finish()),
            Arc::new(filtered_azimuth.finish()),
            Arc::new(elevation.finish()),
            Arc::new(filtered_elevation.finish()),
            Arc::new(samples_used.finish()),
        ];

        #[cfg(feature = "raw_iq")]
        {
            arrays.push(Arc::new(iq_antenna.finish()));
            arrays.push(Arc::new(iq_time.finish()));
            arrays.push(Arc::new(iq_i.finish()));
            arrays.push(Arc::new(iq_q.finish()));
        }

        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        self.write(batch)
    }
}
