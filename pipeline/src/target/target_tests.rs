#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use ndarray::{array, Array1, Array2, Array3};
    use qtty::Seconds;

    use crate::detrend::{from_fn, FitError, Model, ZeroModel};
    use crate::error::PipelineError;
    use crate::mission::{Acquisition, Mission};
    use crate::models::{PixelStamp, Season, TargetId};
    use crate::report::{
        CellContent, LayoutError, RenderError, ReportPage, ReportRenderer, ReportRoles,
        DEFAULT_LAYOUT,
    };
    use crate::target::{PipelineState, Stage, Target, TargetError};

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("fake mission: {0}")]
    struct FakeError(String);

    /// Mission serving one in-memory stamp.
    #[derive(Debug)]
    struct FakeMission {
        stamp: Option<PixelStamp>,
        aperture: Result<Option<Array2<u8>>, String>,
        layout: String,
        acquisitions: AtomicUsize,
    }

    impl FakeMission {
        fn with_stamp(stamp: PixelStamp) -> Self {
            Self {
                stamp: Some(stamp),
                aperture: Ok(None),
                layout: DEFAULT_LAYOUT.to_string(),
                acquisitions: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                stamp: None,
                ..Self::with_stamp(single_pixel())
            }
        }
    }

    impl Mission for FakeMission {
        type Error = FakeError;

        fn name(&self) -> &str {
            "Fake"
        }

        fn format_identifier(&self, id: &TargetId) -> String {
            format!("F-{}", id)
        }

        fn time_unit(&self) -> &str {
            "days"
        }

        fn magnitude_band(&self) -> &str {
            "V"
        }

        fn acquire_raw(
            &self,
            _id: &TargetId,
            season: Option<Season>,
        ) -> Result<Acquisition, FakeError> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            let stamp = self
                .stamp
                .clone()
                .ok_or_else(|| FakeError("archive offline".into()))?;
            Ok(Acquisition {
                stamp,
                season: season.unwrap_or(Season::new(3)),
                magnitude: Some(10.5),
            })
        }

        fn select_aperture(&self, stamp: &PixelStamp) -> Result<Array2<u8>, FakeError> {
            match &self.aperture {
                Ok(Some(mask)) => Ok(mask.clone()),
                Ok(None) => Ok(Array2::ones((stamp.nrows(), stamp.ncols()))),
                Err(msg) => Err(FakeError(msg.clone())),
            }
        }

        fn default_cadence(&self) -> Seconds {
            Seconds::new(1800.0)
        }

        fn layout_spec(&self) -> String {
            self.layout.clone()
        }

        fn report_roles(&self) -> ReportRoles {
            ReportRoles::default()
        }
    }

    /// Keeps rendered pages instead of writing files.
    #[derive(Default)]
    struct RecordingRenderer {
        pages: Mutex<Vec<(PathBuf, ReportPage)>>,
    }

    impl ReportRenderer for RecordingRenderer {
        fn extension(&self) -> &str {
            "rec"
        }

        fn render(&self, page: &ReportPage, path: &Path) -> Result<(), RenderError> {
            self.pages
                .lock()
                .unwrap()
                .push((path.to_path_buf(), page.clone()));
            Ok(())
        }
    }

    struct BrokenRenderer;

    impl ReportRenderer for BrokenRenderer {
        fn extension(&self) -> &str {
            "broken"
        }

        fn render(&self, _page: &ReportPage, _path: &Path) -> Result<(), RenderError> {
            Err(RenderError::drawing("no canvas"))
        }
    }

    fn single_pixel() -> PixelStamp {
        PixelStamp::new(
            array![0.0, 1.0, 2.0],
            array![[[10.0]], [[20.0]], [[30.0]]],
            Some(Array3::ones((3, 1, 1))),
            None,
        )
        .unwrap()
    }

    fn two_by_two() -> PixelStamp {
        PixelStamp::new(
            array![0.0, 1.0, 2.0],
            Array3::from_elem((3, 2, 2), 5.0),
            None,
            None,
        )
        .unwrap()
    }

    fn stepped_model() -> impl crate::detrend::Detrender {
        from_fn(|_lc: &crate::models::Lightcurve| Ok(Model::new(array![1.0, 2.0, 3.0])))
    }

    #[test]
    fn test_aperture_before_acquisition_fails() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        let err = target.set_aperture(array![[1]]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutOfOrder {
                stage: Stage::Aperture,
                state: PipelineState::Created
            }
        ));
        assert!(matches!(
            target.select_aperture(),
            Err(TargetError::Pipeline(PipelineError::OutOfOrder { .. }))
        ));
        assert_eq!(target.state(), PipelineState::Created);
        assert!(target.lightcurve().is_none());
    }

    #[test]
    fn test_fit_and_report_require_prerequisites() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        target.acquire().unwrap();
        assert!(matches!(
            target.fit(&ZeroModel),
            Err(PipelineError::OutOfOrder { stage: Stage::Fit, .. })
        ));
        target.select_aperture().unwrap();
        assert!(matches!(
            target.report(&RecordingRenderer::default(), Path::new("x.rec")),
            Err(PipelineError::OutOfOrder { stage: Stage::Report, .. })
        ));
        assert_eq!(target.state(), PipelineState::ApertureSet);
    }

    #[test]
    fn test_end_to_end_single_pixel() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        target.acquire().unwrap();
        target.select_aperture().unwrap();

        let lc = target.lightcurve().unwrap();
        assert_eq!(lc.raw_flux().to_vec(), vec![10.0, 20.0, 30.0]);
        assert_eq!(lc.raw_error().to_vec(), vec![1.0, 1.0, 1.0]);

        target.fit(&stepped_model()).unwrap();
        let lc = target.lightcurve().unwrap();
        assert_eq!(lc.flux().to_vec(), vec![9.0, 18.0, 27.0]);
        assert_eq!(lc.raw_flux().to_vec(), vec![10.0, 20.0, 30.0]);
        assert_eq!(target.state(), PipelineState::ModelFit);

        let renderer = RecordingRenderer::default();
        target.report(&renderer, Path::new("out.rec")).unwrap();
        assert_eq!(target.state(), PipelineState::Reported);

        let pages = renderer.pages.lock().unwrap();
        let (path, page) = &pages[0];
        assert_eq!(path, Path::new("out.rec"));
        match &page.cell(0).unwrap().content {
            CellContent::Text(lines) => {
                assert_eq!(lines[0], "Fake / F-7");
                assert!(lines[1].contains("Season 3"));
                assert!(lines[1].contains("V = 10.50"));
                assert!(lines[1].contains("Cadence 1800 s"));
            }
            other => panic!("header should be text, got {:?}", other),
        }
        match &page.cell(3).unwrap().content {
            CellContent::Series(plot) => assert_eq!(plot.y, vec![9.0, 18.0, 27.0]),
            other => panic!("detrended panel should be a series, got {:?}", other),
        }
        assert!(page.cell(2).unwrap().content.is_empty());
    }

    #[test]
    fn test_acquisition_error_surfaced_unchanged() {
        let mut target = Target::new(FakeMission::empty(), "WASP-47");
        let err = target.acquire().unwrap_err();
        match &err {
            TargetError::Acquisition(inner) => {
                assert_eq!(inner, &FakeError("archive offline".into()))
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.is_retryable());
        assert_eq!(target.state(), PipelineState::Created);
    }

    #[test]
    fn test_acquire_only_once() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        target.acquire().unwrap();
        assert!(matches!(
            target.acquire(),
            Err(TargetError::Pipeline(PipelineError::OutOfOrder {
                stage: Stage::Acquire,
                state: PipelineState::RawAcquired
            }))
        ));
        assert_eq!(target.mission().acquisitions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acquisition_resolves_season_and_magnitude() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        assert_eq!(target.season(), None);
        target.acquire().unwrap();
        assert_eq!(target.season(), Some(Season::new(3)));
        assert_eq!(target.magnitude(), Some(10.5));

        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64)
            .with_season(Season::new(8))
            .with_magnitude(12.0)
            .with_cadence(Seconds::new(60.0));
        target.acquire().unwrap();
        assert_eq!(target.season(), Some(Season::new(8)));
        assert_eq!(target.magnitude(), Some(12.0));
        assert_eq!(target.cadence().value(), 60.0);
    }

    #[test]
    fn test_mission_aperture_errors() {
        let mut mission = FakeMission::with_stamp(two_by_two());
        mission.aperture = Err("no pixels above threshold".into());
        let mut target = Target::new(mission, 7u64);
        target.acquire().unwrap();
        assert!(matches!(
            target.select_aperture(),
            Err(TargetError::ApertureSelection(_))
        ));
        assert_eq!(target.state(), PipelineState::RawAcquired);

        let mut mission = FakeMission::with_stamp(two_by_two());
        mission.aperture = Ok(Some(Array2::zeros((2, 2))));
        let mut target = Target::new(mission, 7u64);
        target.acquire().unwrap();
        assert!(matches!(
            target.select_aperture(),
            Err(TargetError::Pipeline(PipelineError::InvalidAperture(_)))
        ));
        assert_eq!(target.state(), PipelineState::RawAcquired);

        let mut mission = FakeMission::with_stamp(two_by_two());
        mission.aperture = Ok(Some(Array2::ones((3, 3))));
        let mut target = Target::new(mission, 7u64);
        target.acquire().unwrap();
        let err = target.select_aperture().unwrap_err();
        match err {
            TargetError::Pipeline(PipelineError::InvalidAperture(message)) => {
                assert!(message.contains("(3, 3)"), "{}", message);
                assert!(message.contains("(2, 2)"), "{}", message);
            }
            other => panic!("expected InvalidAperture, got {:?}", other),
        }
        assert!(matches!(
            target.set_aperture(Array2::ones((3, 3))),
            Err(PipelineError::InvalidAperture(_))
        ));
        assert_eq!(target.state(), PipelineState::RawAcquired);
    }

    #[test]
    fn test_fit_failure_leaves_aperture_set() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        target.acquire().unwrap();
        target.select_aperture().unwrap();

        let failing = from_fn(|_lc: &crate::models::Lightcurve| Err(FitError::failed("singular")));
        let err = target.fit(&failing).unwrap_err();
        assert!(matches!(err, PipelineError::Fit(_)));
        assert!(err.is_retryable());
        assert_eq!(target.state(), PipelineState::ApertureSet);

        let short = from_fn(|_lc: &crate::models::Lightcurve| Ok(Model::new(Array1::zeros(2))));
        assert!(matches!(
            target.fit(&short),
            Err(PipelineError::ShapeMismatch { what: "model", .. })
        ));
        assert_eq!(target.state(), PipelineState::ApertureSet);

        target.fit(&stepped_model()).unwrap();
        assert_eq!(target.state(), PipelineState::ModelFit);
    }

    #[test]
    fn test_new_aperture_keeps_model_but_requires_refit() {
        let mut target = Target::new(FakeMission::with_stamp(two_by_two()), 7u64);
        target.acquire().unwrap();
        target.select_aperture().unwrap();
        target.fit(&stepped_model()).unwrap();
        assert_eq!(target.lightcurve().unwrap().flux().to_vec(), vec![19.0, 18.0, 17.0]);

        target.set_aperture(array![[1, 0], [0, 0]]).unwrap();
        assert_eq!(target.state(), PipelineState::ApertureSet);
        assert_eq!(target.lightcurve().unwrap().flux().to_vec(), vec![4.0, 3.0, 2.0]);
        assert!(target
            .report(&RecordingRenderer::default(), Path::new("x"))
            .is_err());
    }

    #[test]
    fn test_render_failure_keeps_state() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        target.acquire().unwrap();
        target.select_aperture().unwrap();
        target.fit(&ZeroModel).unwrap();
        let err = target.report(&BrokenRenderer, Path::new("x")).unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
        assert_eq!(target.state(), PipelineState::ModelFit);
    }

    #[test]
    fn test_report_is_idempotent() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        let renderer = RecordingRenderer::default();
        target.run(&ZeroModel, &renderer, Path::new("reports")).unwrap();
        target.report(&renderer, Path::new("reports/again.rec")).unwrap();
        target.report(&renderer, Path::new("reports/again.rec")).unwrap();
        assert_eq!(target.state(), PipelineState::Reported);
        assert_eq!(renderer.pages.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_run_does_not_reacquire() {
        let mut target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        let renderer = RecordingRenderer::default();

        let path = target.run(&ZeroModel, &renderer, Path::new("reports")).unwrap();
        assert_eq!(path, Path::new("reports/fake-7-c03.rec"));
        assert_eq!(target.state(), PipelineState::Reported);

        target.run(&stepped_model(), &renderer, Path::new("reports")).unwrap();
        assert_eq!(target.mission().acquisitions.load(Ordering::SeqCst), 1);
        assert_eq!(target.lightcurve().unwrap().flux().to_vec(), vec![9.0, 18.0, 27.0]);
    }

    #[test]
    fn test_labels_fill_unused_cells() {
        let mut target =
            Target::new(FakeMission::with_stamp(single_pixel()), 7u64).with_labels(true);
        target.acquire().unwrap();
        target.select_aperture().unwrap();
        target.fit(&ZeroModel).unwrap();
        let page = target.report_page().unwrap();
        assert_eq!(
            page.cell(2).unwrap().content,
            CellContent::Text(vec!["Cell #02".to_string()])
        );
        assert!(matches!(page.cell(1).unwrap().content, CellContent::Series(_)));
    }

    #[test]
    fn test_layout_without_roles_fails_report() {
        let mut mission = FakeMission::with_stamp(single_pixel());
        mission.layout = "0 0\n1 1\n2 2".to_string();
        let mut target = Target::new(mission, 7u64);
        target.acquire().unwrap();
        target.select_aperture().unwrap();
        target.fit(&ZeroModel).unwrap();
        let err = target.report_page().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Layout(LayoutError::MissingRole { id: 3, .. })
        ));
    }

    #[test]
    fn test_display() {
        let target = Target::new(FakeMission::with_stamp(single_pixel()), 7u64);
        assert_eq!(target.to_string(), "<Fake Target: F-7>");
        assert_eq!(target.display_id(), "F-7");
    }
}
