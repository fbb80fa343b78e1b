pub mod stub_detectors;
