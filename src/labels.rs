//! COCO class table for MobileNet-SSD style detectors.
//!
//! Ids follow the 91-slot COCO numbering used by the TensorFlow object
//! detection exports, so some ids are unused. Id 0 is the background class.

/// Categories that drive the signal when nothing else is configured.
pub const DEFAULT_CATEGORIES: [u32; 4] = [PERSON, BICYCLE, CAR, MOTORCYCLE];

pub const PERSON: u32 = 1;
pub const BICYCLE: u32 = 2;
pub const CAR: u32 = 3;
pub const MOTORCYCLE: u32 = 4;

static COCO_LABELS: &[(u32, &str)] = &[
    (0, "background"),
    (1, "person"),
    (2, "bicycle"),
    (3, "car"),
    (4, "motorcycle"),
    (5, "airplane"),
    (6, "bus"),
    (7, "train"),
    (8, "truck"),
    (9, "boat"),
    (10, "traffic light"),
    (11, "fire hydrant"),
    (13, "stop sign"),
    (14, "parking meter"),
    (15, "bench"),
    (16, "bird"),
    (17, "cat"),
    (18, "dog"),
    (19, "horse"),
    (20, "sheep"),
    (21, "cow"),
    (22, "elephant"),
    (23, "bear"),
    (24, "zebra"),
    (25, "giraffe"),
    (27, "backpack"),
    (28, "umbrella"),
    (31, "handbag"),
    (32, "tie"),
    (33, "suitcase"),
    (34, "frisbee"),
    (35, "skis"),
    (36, "snowboard"),
    (37, "sports ball"),
    (38, "kite"),
    (39, "baseball bat"),
    (40, "baseball glove"),
    (41, "skateboard"),
    (42, "surfboard"),
    (43, "tennis racket"),
    (44, "bottle"),
    (46, "wine glass"),
    (47, "cup"),
    (48, "fork"),
    (49, "knife"),
    (50, "spoon"),
    (51, "bowl"),
    (52, "banana"),
    (53, "apple"),
    (54, "sandwich"),
    (55, "orange"),
    (56, "broccoli"),
    (57, "carrot"),
    (58, "hot dog"),
    (59, "pizza"),
    (60, "donut"),
    (61, "cake"),
    (62, "chair"),
    (63, "couch"),
    (64, "potted plant"),
    (65, "bed"),
    (67, "dining table"),
    (70, "toilet"),
    (72, "tv"),
    (73, "laptop"),
    (74, "mouse"),
    (75, "remote"),
    (76, "keyboard"),
    (77, "cell phone"),
    (78, "microwave"),
    (79, "oven"),
    (80, "toaster"),
    (81, "sink"),
    (82, "refrigerator"),
    (84, "book"),
    (85, "clock"),
    (86, "vase"),
    (87, "scissors"),
    (88, "teddy bear"),
    (89, "hair drier"),
    (90, "toothbrush"),
];

pub fn label_for(class_id: u32) -> Option<&'static str> {
    COCO_LABELS
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| *name)
}

/// Case-insensitive lookup; `_` and `-` match spaces ("traffic_light").
pub fn class_id_for_name(name: &str) -> Option<u32> {
    let wanted = name.trim().to_lowercase().replace(['_', '-'], " ");
    COCO_LABELS
        .iter()
        .find(|(_, label)| *label == wanted)
        .map(|(id, _)| *id)
}

/// Resolve a category given either as a numeric id or a label name.
pub fn resolve_category(entry: &str) -> Option<u32> {
    let entry = entry.trim();
    match entry.parse::<u32>() {
        Ok(id) => label_for(id).map(|_| id),
        Err(_) => class_id_for_name(entry),
    }
}

/// Label for logs, falling back to the numeric id.
pub fn display_label(class_id: u32) -> String {
    label_for(class_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("class {}", class_id))
}
