use dicom::{
    core::{DataElement, PrimitiveValue, VR},
    object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject},
};
use dicom_dictionary_std::{tags, uids};
use dicom_mpr::{
    AssemblyError, DisplayArtifact, Orientation, SliceIndices, SliceOrdering, SortBy,
    SortKeyMissing, TraceRenderer, ViewerSession, VolumeLoader, VolumeLoaderError,
};
use std::{fs, path::PathBuf};

const ROWS: u16 = 2;
const COLUMNS: u16 = 3;

fn ct_object(
    rows: u16,
    columns: u16,
    frames: u32,
    first_value: u16,
    instance_number: Option<&str>,
) -> FileDicomObject<InMemDicomObject> {
    let len = rows as usize * columns as usize * frames as usize;
    let pixels: Vec<u16> = (0..len as u16).map(|i| first_value + i * 7).collect();

    into_file(ct_dataset(rows, columns, frames, pixels, instance_number))
}

fn ct_dataset(
    rows: u16,
    columns: u16,
    frames: u32,
    pixels: Vec<u16>,
    instance_number: Option<&str>,
) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SAMPLES_PER_PIXEL,
        VR::US,
        PrimitiveValue::from(1_u16),
    ));
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2 "),
    ));
    obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)));
    obj.put(DataElement::new(
        tags::COLUMNS,
        VR::US,
        PrimitiveValue::from(columns),
    ));
    obj.put(DataElement::new(
        tags::BITS_ALLOCATED,
        VR::US,
        PrimitiveValue::from(16_u16),
    ));
    obj.put(DataElement::new(
        tags::BITS_STORED,
        VR::US,
        PrimitiveValue::from(16_u16),
    ));
    obj.put(DataElement::new(
        tags::HIGH_BIT,
        VR::US,
        PrimitiveValue::from(15_u16),
    ));
    obj.put(DataElement::new(
        tags::PIXEL_REPRESENTATION,
        VR::US,
        PrimitiveValue::from(0_u16),
    ));
    if frames > 1 {
        obj.put(DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from(format!("{frames} ")),
        ));
    }
    if let Some(number) = instance_number {
        obj.put(DataElement::new(
            tags::INSTANCE_NUMBER,
            VR::IS,
            PrimitiveValue::from(number),
        ));
    }
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::U16(pixels.into()),
    ));
    obj
}

fn into_file(obj: InMemDicomObject) -> FileDicomObject<InMemDicomObject> {
    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
            .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1"),
    )
    .expect("should have built file meta table")
}

fn series(
    objects: Vec<FileDicomObject<InMemDicomObject>>,
) -> Vec<(String, FileDicomObject<InMemDicomObject>)> {
    objects
        .into_iter()
        .enumerate()
        .map(|(i, obj)| (format!("slice-{i}.dcm"), obj))
        .collect()
}

#[test]
fn series_is_sorted_by_instance_number() {
    let objects = series(vec![
        ct_object(ROWS, COLUMNS, 1, 300, Some("3 ")),
        ct_object(ROWS, COLUMNS, 1, 100, Some("1 ")),
        ct_object(ROWS, COLUMNS, 1, 200, Some("2 ")),
    ]);

    let assembly = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap();

    assert_eq!(assembly.ordering, SliceOrdering::Sorted);
    assert_eq!(assembly.volume.dim(), (3, 2, 3));
    assert_eq!(assembly.volume.data().iter().min(), Some(&0));
    assert_eq!(assembly.volume.data().iter().max(), Some(&255));
}

fn row_slice(pixels: [u16; 2], instance_number: &str) -> InMemDicomObject {
    ct_dataset(1, 2, 1, pixels.to_vec(), Some(instance_number))
}

#[test]
fn unwindowed_slices_share_one_intensity_scale() {
    let objects = series(vec![
        into_file(row_slice([0, 100], "1 ")),
        into_file(row_slice([0, 1000], "2 ")),
    ]);

    let assembly = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap();

    assert_eq!(assembly.volume.dim(), (2, 1, 2));
    assert_eq!(
        assembly.volume.data().iter().copied().collect::<Vec<u8>>(),
        vec![0, 25, 0, 255]
    );
}

#[test]
fn window_level_is_applied_before_normalization() {
    let windowed = |pixels: [u16; 2], number: &'static str| {
        let mut obj = row_slice(pixels, number);
        obj.put(DataElement::new(
            tags::WINDOW_CENTER,
            VR::DS,
            PrimitiveValue::from("250"),
        ));
        obj.put(DataElement::new(
            tags::WINDOW_WIDTH,
            VR::DS,
            PrimitiveValue::from("100"),
        ));
        into_file(obj)
    };
    let objects = series(vec![windowed([0, 500], "1 "), windowed([0, 1000], "2 ")]);

    let assembly = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap();

    // Everything above the window saturates, so 500 and 1000 look the same
    assert_eq!(
        assembly.volume.data().iter().copied().collect::<Vec<u8>>(),
        vec![0, 255, 0, 255]
    );
}

#[test]
fn missing_instance_number_keeps_upload_order() {
    let objects = series(vec![
        ct_object(ROWS, COLUMNS, 1, 0, Some("2 ")),
        ct_object(ROWS, COLUMNS, 1, 50, None),
        ct_object(ROWS, COLUMNS, 1, 100, Some("1 ")),
    ]);

    let assembly = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap();

    assert_eq!(
        assembly.ordering,
        SliceOrdering::UploadOrder(SortKeyMissing { slice: 1 })
    );
    assert_eq!(assembly.volume.dim(), (3, 2, 3));
}

#[test]
fn mismatched_slices_produce_no_volume() {
    let objects = series(vec![
        ct_object(ROWS, COLUMNS, 1, 0, Some("1 ")),
        ct_object(ROWS + 2, COLUMNS, 1, 0, Some("2 ")),
    ]);

    let err = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap_err();

    assert!(matches!(
        err,
        VolumeLoaderError::Assembly(AssemblyError::DimensionMismatch {
            index: 1,
            expected: (2, 3),
            found: (4, 3),
        })
    ));
}

#[test]
fn single_image_is_not_a_volume() {
    let objects = series(vec![ct_object(ROWS, COLUMNS, 1, 0, Some("1 "))]);

    let err = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap_err();

    assert!(matches!(
        err,
        VolumeLoaderError::Assembly(AssemblyError::NotVolumetric { shape: (2, 3) })
    ));
}

#[test]
fn multi_frame_object_is_a_volume() {
    let objects = series(vec![ct_object(ROWS, COLUMNS, 4, 0, None)]);

    let assembly = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap();

    assert_eq!(assembly.ordering, SliceOrdering::Unsorted);
    assert_eq!(assembly.volume.dim(), (4, 2, 3));
}

#[test]
fn byte_streams_are_loaded() {
    let sources: Vec<(String, Vec<u8>)> = [("b", "2 "), ("a", "1 ")]
        .into_iter()
        .map(|(name, number)| {
            let mut bytes = Vec::new();
            ct_object(ROWS, COLUMNS, 1, 10, Some(number))
                .write_all(&mut bytes)
                .expect("should have written DICOM file");
            (name.to_string(), bytes)
        })
        .collect();

    let assembly = VolumeLoader::load_from_readers(
        sources
            .iter()
            .map(|(name, bytes)| (name.clone(), bytes.as_slice())),
        SortBy::InstanceNumber,
    )
    .unwrap();

    assert_eq!(assembly.ordering, SliceOrdering::Sorted);
    assert_eq!(assembly.volume.dim(), (2, 2, 3));
}

#[test]
fn unreadable_stream_is_a_decode_failure() {
    let garbage = vec![0xAB_u8; 64];

    let err = VolumeLoader::load_from_readers(
        [("broken.dcm".to_string(), garbage.as_slice())],
        SortBy::InstanceNumber,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        VolumeLoaderError::DecodeFailure { ref name, .. } if name == "broken.dcm"
    ));
}

struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(name: &str) -> Self {
        let path =
            std::env::temp_dir().join(format!("dicom-mpr-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("should have created scratch directory");
        Self(path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn directory_session_reslices_and_renders() {
    let dir = ScratchDir::new("session");
    for (file, number) in [("c.DCM", "3 "), ("a.dcm", "1 "), ("b.dcm", "2 ")] {
        ct_object(ROWS, COLUMNS, 1, 0, Some(number))
            .write_to_file(dir.0.join(file))
            .expect("should have written DICOM file");
    }
    fs::write(dir.0.join("notes.txt"), "not a DICOM file").unwrap();

    let mut session = ViewerSession::load_directory(&dir.0, SortBy::InstanceNumber).unwrap();

    assert!(session.warning().is_none());
    assert_eq!(session.indices(), SliceIndices::new(1, 1, 1));
    assert_eq!(session.set_index(Orientation::Coronal, 7), 1);

    let views = session.views().unwrap();
    assert_eq!(views.axial.dim(), (2, 3));
    assert_eq!(views.coronal.dim(), (3, 3));
    assert_eq!(views.sagittal.dim(), (3, 2));

    let artifact = session.render(&TraceRenderer::default()).unwrap();
    assert!(matches!(artifact, DisplayArtifact::Scene(trace) if trace.len() == 18));
}

#[test]
fn empty_directory_has_no_images() {
    let dir = ScratchDir::new("empty");

    let err = VolumeLoader::load_from_directory(&dir.0, SortBy::InstanceNumber).unwrap_err();

    assert!(matches!(err, VolumeLoaderError::NoValidImages));
}
